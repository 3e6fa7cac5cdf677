//! Cypher rendering.
//!
//! Every statement matches or merges on natural keys only. String literals are
//! single-quoted; only `\` and `'` are escaped, so free text (including raw
//! newlines and double quotes) appears in the statement unchanged.

use mdb_model::NaturalKey;

use crate::statement::{IndexSpec, Link, Literal, MutationOp};

/// Render `s` as a single-quoted Cypher string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Inverse of [`quote`]. `None` if `lit` is not a well-formed literal.
pub fn unquote(lit: &str) -> Option<String> {
    let inner = lit.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                e @ ('\\' | '\'') => out.push(e),
                _ => return None,
            },
            '\'' => return None,
            _ => out.push(c),
        }
    }
    Some(out)
}

pub fn literal(value: &Literal) -> String {
    match value {
        Literal::Str(s) => quote(s),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
    }
}

fn key_map(key: &NaturalKey, commit: Option<&str>) -> String {
    let mut parts: Vec<String> = key
        .fields()
        .into_iter()
        .map(|(name, value)| format!("{name}:{}", quote(&value)))
        .collect();
    if let Some(commit) = commit {
        parts.push(format!("_commit:{}", quote(commit)));
    }
    format!("{{{}}}", parts.join(", "))
}

fn pattern(var: &str, key: &NaturalKey) -> String {
    format!("({var}:{} {})", key.label(), key_map(key, None))
}

fn assignments(var: &str, attrs: &[(String, Literal)]) -> String {
    attrs
        .iter()
        .map(|(name, value)| format!("{var}.{name} = {}", literal(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn commit_attr(commit: &str) -> (String, Literal) {
    ("_commit".to_string(), Literal::Str(commit.to_string()))
}

// ============================================================================
// Forward statements
// ============================================================================

pub fn render(op: &MutationOp, commit: &str) -> String {
    match op {
        MutationOp::CreateConstraint {
            name,
            label,
            properties,
        } => {
            let props: Vec<String> = properties.iter().map(|p| format!("n.{p}")).collect();
            format!(
                "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE ({}) IS UNIQUE",
                props.join(", ")
            )
        }
        MutationOp::CreateIndex(spec) => render_index(spec),
        MutationOp::InstallTrigger { name, query } => format!(
            "CALL apoc.trigger.install('neo4j', {}, {}, {{phase: 'afterAsync'}})",
            quote(name),
            quote(query)
        ),
        MutationOp::MergeEntity { key, on_create, set } => {
            let mut created = vec![commit_attr(commit)];
            created.extend(on_create.iter().cloned());
            let mut text = format!(
                "MERGE {} ON CREATE SET {}",
                pattern("n0", key),
                assignments("n0", &created)
            );
            if !set.is_empty() {
                text.push_str(" SET ");
                text.push_str(&assignments("n0", set));
            }
            text
        }
        MutationOp::MergeLinks { merged, links } => render_links(op, merged, links, commit),
        MutationOp::MarkLatest { handle, version } => {
            let key = NaturalKey::Model {
                handle: handle.clone(),
                version: version.clone(),
            };
            format!("MATCH {} SET n0.is_latest_version = true", pattern("n0", &key))
        }
        MutationOp::RevokeLatest {
            handle,
            keep_version,
        } => format!(
            "MATCH (n0:model {{handle:{}}}) WHERE n0.version <> {} AND n0.is_latest_version = true SET n0.is_latest_version = false",
            quote(handle),
            quote(keep_version)
        ),
    }
}

fn render_index(spec: &IndexSpec) -> String {
    let labels = spec.labels.join("|");
    let props: Vec<String> = spec.properties.iter().map(|p| format!("n.{p}")).collect();
    if spec.fulltext {
        format!(
            "CREATE FULLTEXT INDEX {} IF NOT EXISTS FOR (n:{labels}) ON EACH [{}]",
            spec.name,
            props.join(", ")
        )
    } else {
        format!(
            "CREATE INDEX {} IF NOT EXISTS FOR (n:{labels}) ON ({})",
            spec.name,
            props.join(", ")
        )
    }
}

/// Variables: matched endpoints first, then merged entities, numbered `n0..`.
fn render_links(op: &MutationOp, merged: &[NaturalKey], links: &[Link], commit: &str) -> String {
    let matched = op.references();
    let vars: Vec<&NaturalKey> = matched.iter().copied().chain(merged.iter()).collect();
    let var = |key: &NaturalKey| {
        let idx = vars.iter().position(|k| *k == key).unwrap_or(0);
        format!("n{idx}")
    };

    let mut clauses = Vec::new();
    if !matched.is_empty() {
        let patterns: Vec<String> = matched
            .iter()
            .map(|&k| pattern(&var(k), k))
            .collect();
        clauses.push(format!("MATCH {}", patterns.join(", ")));
    }
    for key in merged {
        let v = var(key);
        clauses.push(format!(
            "MERGE {} ON CREATE SET {}",
            pattern(&v, key),
            assignments(&v, &[commit_attr(commit)])
        ));
    }
    for (i, link) in links.iter().enumerate() {
        let r = format!("r{i}");
        clauses.push(format!(
            "MERGE ({})-[{r}:{}]->({}) ON CREATE SET {}",
            var(&link.src),
            link.rel.as_str(),
            var(&link.dst),
            assignments(&r, &[commit_attr(commit)])
        ));
    }
    clauses.join("\n")
}

// ============================================================================
// Rollbacks
// ============================================================================

/// Statements undoing only what `op` created under `commit`. Deletions never
/// cascade beyond the created entity's own relationships.
pub fn render_rollback(op: &MutationOp, commit: &str) -> Vec<String> {
    match op {
        MutationOp::MergeEntity { key, .. } => vec![delete_created(key, commit)],
        MutationOp::MergeLinks { merged, links } => {
            let mut out: Vec<String> = links
                .iter()
                .map(|link| {
                    format!(
                        "MATCH {}-[r0:{} {{_commit:{}}}]->{} DELETE r0",
                        pattern("n0", &link.src),
                        link.rel.as_str(),
                        quote(commit),
                        pattern("n1", &link.dst)
                    )
                })
                .collect();
            out.extend(merged.iter().map(|key| delete_created(key, commit)));
            out
        }
        MutationOp::MarkLatest { handle, version } => {
            let key = NaturalKey::Model {
                handle: handle.clone(),
                version: version.clone(),
            };
            vec![format!(
                "MATCH {} SET n0.is_latest_version = false",
                pattern("n0", &key)
            )]
        }
        MutationOp::RevokeLatest { .. }
        | MutationOp::CreateConstraint { .. }
        | MutationOp::CreateIndex(_)
        | MutationOp::InstallTrigger { .. } => Vec::new(),
    }
}

fn delete_created(key: &NaturalKey, commit: &str) -> String {
    format!(
        "MATCH (n0:{} {}) DETACH DELETE n0",
        key.label(),
        key_map(key, Some(commit))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::RelType;
    use mdb_mdf::Tag;

    #[test]
    fn quote_escapes_only_backslash_and_single_quote() {
        assert_eq!(quote(r#"say "hi""#), r#"'say "hi"'"#);
        assert_eq!(quote("it's"), r"'it\'s'");
        assert_eq!(quote(r"a\b"), r"'a\\b'");
        assert_eq!(quote("two\nlines"), "'two\nlines'");
    }

    #[test]
    fn unquote_rejects_malformed() {
        assert_eq!(unquote("'ok'"), Some("ok".into()));
        assert_eq!(unquote("'bad\\n'"), None);
        assert_eq!(unquote("'open"), None);
        assert_eq!(unquote("'a'b'"), None);
    }

    #[test]
    fn merge_entity_shape() {
        let op = MutationOp::MergeEntity {
            key: NaturalKey::node("TEST", "node_1"),
            on_create: vec![],
            set: vec![("desc".into(), Literal::from("First node"))],
        };
        assert_eq!(
            render(&op, "c1"),
            "MERGE (n0:node {model:'TEST', handle:'node_1'}) ON CREATE SET n0._commit = 'c1' SET n0.desc = 'First node'"
        );
        assert_eq!(
            render_rollback(&op, "c1"),
            vec!["MATCH (n0:node {model:'TEST', handle:'node_1', _commit:'c1'}) DETACH DELETE n0"]
        );
    }

    #[test]
    fn merge_links_matches_endpoints_and_merges_new_entities() {
        let node = NaturalKey::node("TEST", "node_1");
        let tag = NaturalKey::Tag(Tag::new("Category", "study"));
        let op = MutationOp::MergeLinks {
            merged: vec![tag.clone()],
            links: vec![Link::new(node, RelType::HasTag, tag)],
        };
        assert_eq!(
            render(&op, "c1"),
            "MATCH (n0:node {model:'TEST', handle:'node_1'})\n\
             MERGE (n1:tag {key:'Category', value:'study'}) ON CREATE SET n1._commit = 'c1'\n\
             MERGE (n0)-[r0:has_tag]->(n1) ON CREATE SET r0._commit = 'c1'"
        );
        let rollback = render_rollback(&op, "c1");
        assert_eq!(rollback.len(), 2);
        assert!(rollback[0].starts_with("MATCH (n0:node"));
        assert!(rollback[0].contains("-[r0:has_tag {_commit:'c1'}]->"));
        assert!(rollback[1].ends_with("DETACH DELETE n0"));
    }

    #[test]
    fn uncoded_term_merges_on_its_value() {
        let key = NaturalKey::Term(mdb_mdf::TermKey {
            origin: "local".into(),
            id: mdb_mdf::TermId::Value("v".into()),
        });
        let op = MutationOp::MergeEntity {
            key,
            on_create: vec![],
            set: vec![("value".to_string(), Literal::from("v"))],
        };
        assert_eq!(
            render(&op, "c"),
            "MERGE (n0:term {origin_name:'local', origin_id:'v'}) ON CREATE SET n0._commit = 'c' SET n0.value = 'v'"
        );
    }

    #[test]
    fn constraint_is_guarded() {
        let op = MutationOp::CreateConstraint {
            name: "node_natural_key".into(),
            label: "node".into(),
            properties: vec!["model".into(), "handle".into()],
        };
        assert_eq!(
            render(&op, "c"),
            "CREATE CONSTRAINT node_natural_key IF NOT EXISTS FOR (n:node) REQUIRE (n.model, n.handle) IS UNIQUE"
        );
        assert!(render_rollback(&op, "c").is_empty());
    }

    #[test]
    fn revoke_latest_keeps_current_version() {
        let op = MutationOp::RevokeLatest {
            handle: "TEST".into(),
            keep_version: "1.2.3".into(),
        };
        assert_eq!(
            render(&op, "c"),
            "MATCH (n0:model {handle:'TEST'}) WHERE n0.version <> '1.2.3' AND n0.is_latest_version = true SET n0.is_latest_version = false"
        );
    }
}
