//! Compilation of predicates and sort keys into SQLite SQL.
//!
//! Every caller-supplied value, JSON paths included, is bound as a parameter.
//!
//! Field paths follow document-store matching: a path step that lands on an
//! array continues into each element, and a comparison on an array field
//! holds when any element satisfies it. Numeric segments index arrays
//! directly.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use crate::search::{
    array_index, Clause, Comparison, ContentFilter, FieldPath, OrderField, Predicate, Scalar,
};

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Real(f64),
    Text(String),
}

/// SQL text with its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
    aliases: usize,
}

impl SqlFragment {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn push_param(&mut self, param: SqlParam) {
        self.sql.push('?');
        self.params.push(param);
    }

    fn push_field(&mut self, path: &FieldPath) {
        self.push("json_extract(dict_content, ");
        self.push_param(SqlParam::Text(path.json_path()));
        self.push(")");
    }

    fn push_id_list(&mut self, ids: &[i64]) {
        self.push("(");
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_param(SqlParam::Int(*id));
        }
        self.push(")");
    }

    fn next_alias(&mut self) -> String {
        self.aliases += 1;
        format!("j{}", self.aliases)
    }
}

/// `WHERE` body (without the keyword) for a record predicate.
pub fn where_clause(predicate: &Predicate) -> SqlFragment {
    let mut out = SqlFragment::default();
    let clauses = predicate.clauses();
    if clauses.is_empty() {
        out.push("1");
        return out;
    }
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            out.push(" AND ");
        }
        out.push("(");
        push_clause(clause, &mut out);
        out.push(")");
    }
    out
}

fn push_clause(clause: &Clause, out: &mut SqlFragment) {
    match clause {
        Clause::Content(filter) => push_content(filter, out),
        Clause::MetadataFormatIn(ids) if ids.is_empty() => out.push("0"),
        Clause::MetadataFormatIn(ids) => {
            out.push("metadata_format_id IN ");
            out.push_id_list(ids);
        }
        Clause::RegistryIn(ids) if ids.is_empty() => out.push("0"),
        Clause::RegistryIn(ids) => {
            out.push("metadata_format_id IN (SELECT id FROM metadata_formats WHERE registry_id IN ");
            out.push_id_list(ids);
            out.push(")");
        }
        Clause::NotDeleted => out.push("deleted = 0"),
    }
}

fn push_content(filter: &ContentFilter, out: &mut SqlFragment) {
    match filter {
        ContentFilter::All => out.push("1"),
        ContentFilter::And(children) => push_group(children, " AND ", "1", out),
        ContentFilter::Or(children) => push_group(children, " OR ", "0", out),
        ContentFilter::Field { path, cmp } => push_comparison(path, cmp, out),
    }
}

fn push_group(children: &[ContentFilter], joiner: &str, empty: &str, out: &mut SqlFragment) {
    if children.is_empty() {
        out.push(empty);
        return;
    }
    out.push("(");
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push(joiner);
        }
        push_content(child, out);
    }
    out.push(")");
}

/// What must hold where a field path ends.
enum Leaf<'a> {
    /// The node exists, whatever its value
    Present,
    /// The node, or one of its elements, is JSON null
    Null,
    /// The node, or one of its elements, compares `op` to any of `values`
    Compare {
        op: &'static str,
        values: &'a [&'a Scalar],
    },
}

/// The JSON node a path step starts from.
enum Node {
    Root,
    Row(String),
}

fn push_node(node: &Node, out: &mut SqlFragment) {
    match node {
        Node::Root => out.push("'$'"),
        Node::Row(alias) => {
            out.push(alias);
            out.push(".fullkey");
        }
    }
}

fn push_child_path(parent: &Node, segment: &str, out: &mut SqlFragment) {
    let step = match array_index(segment) {
        Some(index) => format!("[{}]", index),
        None => format!(".\"{}\"", segment),
    };
    out.push("(");
    push_node(parent, out);
    out.push(" || ");
    out.push_param(SqlParam::Text(step));
    out.push(")");
}

fn push_child_is_array(parent: &Node, segment: &str, out: &mut SqlFragment) {
    out.push("json_type(records.dict_content, ");
    push_child_path(parent, segment, out);
    out.push(") = 'array'");
}

/// Match `leaf` against every node `segments` reaches from `parent`.
///
/// Each step is a correlated `json_each` over the parent node filtered to the
/// child key, or over the child itself when the child is an array that the
/// next step (or the leaf test) should look into.
fn push_walk(parent: &Node, segments: &[String], leaf: &Leaf<'_>, out: &mut SqlFragment) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push("0");
        return;
    };

    if rest.is_empty() {
        if let Leaf::Present = leaf {
            out.push("json_type(records.dict_content, ");
            push_child_path(parent, segment, out);
            out.push(") IS NOT NULL");
            return;
        }
    }

    // Arrays are entered unless the next step indexes them itself.
    let expand = rest.first().and_then(|next| array_index(next)).is_none();
    let key = match array_index(segment) {
        Some(index) => SqlParam::Int(index),
        None => SqlParam::Text(segment.clone()),
    };
    let alias = out.next_alias();

    out.push("EXISTS (SELECT 1 FROM json_each(records.dict_content, ");
    if expand {
        out.push("CASE WHEN ");
        push_child_is_array(parent, segment, out);
        out.push(" THEN ");
        push_child_path(parent, segment, out);
        out.push(" ELSE ");
        push_node(parent, out);
        out.push(" END");
    } else {
        push_node(parent, out);
    }
    out.push(") AS ");
    out.push(&alias);
    out.push(" WHERE (");
    if expand {
        push_child_is_array(parent, segment, out);
        out.push(" OR ");
    }
    out.push(&alias);
    out.push(".key = ");
    out.push_param(key);
    out.push(") AND ");

    if rest.is_empty() {
        push_leaf(&alias, leaf, out);
    } else {
        push_walk(&Node::Row(alias), rest, leaf, out);
    }
    out.push(")");
}

fn push_leaf(alias: &str, leaf: &Leaf<'_>, out: &mut SqlFragment) {
    match leaf {
        Leaf::Present => out.push("1"),
        Leaf::Null => {
            out.push(alias);
            out.push(".type = 'null'");
        }
        Leaf::Compare { op, values } => {
            out.push("(");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push(" OR ");
                }
                push_scalar_test(alias, op, value, out);
            }
            out.push(")");
        }
    }
}

/// Compare one `json_each` row against a scalar of the same JSON type.
fn push_scalar_test(alias: &str, op: &str, operand: &Scalar, out: &mut SqlFragment) {
    let (types, param) = match operand {
        // Ordering against null matches nothing.
        Scalar::Null => {
            out.push("0");
            return;
        }
        Scalar::Bool(b) if op == " = " => {
            out.push(alias);
            out.push(if *b { ".type = 'true'" } else { ".type = 'false'" });
            return;
        }
        Scalar::Bool(b) => ("('true', 'false')", SqlParam::Int(i64::from(*b))),
        Scalar::Int(i) => ("('integer', 'real')", SqlParam::Int(*i)),
        Scalar::Float(f) => ("('integer', 'real')", SqlParam::Real(*f)),
        Scalar::Text(s) => ("('text')", SqlParam::Text(s.clone())),
    };
    out.push("(");
    out.push(alias);
    out.push(".type IN ");
    out.push(types);
    out.push(" AND ");
    out.push(alias);
    out.push(".value");
    out.push(op);
    out.push_param(param);
    out.push(")");
}

/// Null or missing.
fn push_null_match(path: &FieldPath, out: &mut SqlFragment) {
    out.push("(");
    push_walk(&Node::Root, path.segments(), &Leaf::Null, out);
    out.push(" OR NOT ");
    push_walk(&Node::Root, path.segments(), &Leaf::Present, out);
    out.push(")");
}

fn push_in(path: &FieldPath, values: &[Scalar], out: &mut SqlFragment) {
    let non_null: Vec<&Scalar> = values.iter().filter(|v| **v != Scalar::Null).collect();
    let has_null = non_null.len() < values.len();
    match (non_null.is_empty(), has_null) {
        (true, false) => out.push("0"),
        (true, true) => push_null_match(path, out),
        (false, false) => push_walk(
            &Node::Root,
            path.segments(),
            &Leaf::Compare {
                op: " = ",
                values: &non_null,
            },
            out,
        ),
        (false, true) => {
            out.push("(");
            push_walk(
                &Node::Root,
                path.segments(),
                &Leaf::Compare {
                    op: " = ",
                    values: &non_null,
                },
                out,
            );
            out.push(" OR ");
            push_null_match(path, out);
            out.push(")");
        }
    }
}

fn push_ordered(path: &FieldPath, op: &'static str, operand: &Scalar, out: &mut SqlFragment) {
    if *operand == Scalar::Null {
        out.push("0");
        return;
    }
    push_walk(
        &Node::Root,
        path.segments(),
        &Leaf::Compare {
            op,
            values: &[operand],
        },
        out,
    );
}

fn push_comparison(path: &FieldPath, cmp: &Comparison, out: &mut SqlFragment) {
    match cmp {
        Comparison::Eq(Scalar::Null) => push_null_match(path, out),
        Comparison::Eq(value) => push_ordered(path, " = ", value, out),
        // Negations also hold for missing fields and arrays without a match.
        Comparison::Ne(value) => {
            out.push("NOT ");
            push_comparison(path, &Comparison::Eq(value.clone()), out);
        }
        Comparison::Gt(value) => push_ordered(path, " > ", value, out),
        Comparison::Gte(value) => push_ordered(path, " >= ", value, out),
        Comparison::Lt(value) => push_ordered(path, " < ", value, out),
        Comparison::Lte(value) => push_ordered(path, " <= ", value, out),
        Comparison::In(values) => push_in(path, values, out),
        Comparison::Nin(values) => {
            out.push("NOT (");
            push_in(path, values, out);
            out.push(")");
        }
        Comparison::Exists(exists) => {
            if !*exists {
                out.push("NOT ");
            }
            push_walk(&Node::Root, path.segments(), &Leaf::Present, out);
        }
    }
}

/// Record column backing a well-known sort field.
fn sort_column(field: &str) -> Option<&'static str> {
    match field {
        "title" | "identifier" => Some("identifier"),
        "last_modification_date" | "last_modified" => Some("last_modification_date"),
        "id" => Some("id"),
        _ => None,
    }
}

/// `ORDER BY` body (without the keyword). Record id always breaks ties so
/// windows over the same ordering never overlap.
pub fn order_clause(ordering: &[OrderField]) -> SqlFragment {
    let mut out = SqlFragment::default();
    for order in ordering {
        let direction = if order.descending { " DESC" } else { " ASC" };
        if let Some(column) = sort_column(&order.field) {
            out.push(column);
        } else {
            match FieldPath::parse(&order.field) {
                Ok(path) => out.push_field(&path),
                Err(_) => {
                    tracing::warn!("Ignoring invalid sort field {:?}", order.field);
                    continue;
                }
            }
        }
        out.push(direction);
        out.push(", ");
    }
    out.push("id ASC");
    out
}

/// Bind compiled parameters onto a query in order.
pub fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::Real(f) => query.bind(*f),
            SqlParam::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// `?, ?, ?` for `n` parameters.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
