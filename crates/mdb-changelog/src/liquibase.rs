//! Liquibase changelog XML.
//!
//! ```text
//! <databaseChangeLog xmlns=... xmlns:neo4j=... logicalFilePath="TEST_1.2.3_full">
//!   <changeSet id="1" author="DEFAULT">
//!     <neo4j:cypher>MERGE ...</neo4j:cypher>
//!     <rollback>
//!       <neo4j:cypher>MATCH ... DETACH DELETE n0</neo4j:cypher>
//!     </rollback>
//!   </changeSet>
//! </databaseChangeLog>
//! ```

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::statement::{ChangeStatement, Changeset};
use crate::writer::WriteError;

pub const DBCHANGELOG_NS: &str = "http://www.liquibase.org/xml/ns/dbchangelog";
pub const NEO4J_NS: &str = "http://www.liquibase.org/xml/ns/dbchangelog-ext";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.liquibase.org/xml/ns/dbchangelog \
     http://www.liquibase.org/xml/ns/dbchangelog/dbchangelog-latest.xsd";

type XmlWriter = Writer<Vec<u8>>;

pub fn to_liquibase_xml(changeset: &Changeset) -> Result<String, WriteError> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.write_event(Event::Comment(BytesText::from_escaped(comment_text(
        &header(changeset),
    ))))?;

    let root = BytesStart::new("databaseChangeLog").with_attributes([
        ("xmlns", DBCHANGELOG_NS),
        ("xmlns:neo4j", NEO4J_NS),
        ("xmlns:xsi", XSI_NS),
        ("xsi:schemaLocation", SCHEMA_LOCATION),
        ("logicalFilePath", changeset.id.as_str()),
    ]);
    w.write_event(Event::Start(root))?;
    for stmt in &changeset.statements {
        write_change_set(&mut w, stmt, &changeset.author)?;
    }
    w.write_event(Event::End(BytesEnd::new("databaseChangeLog")))?;

    let mut xml = String::from_utf8(w.into_inner())?;
    xml.push('\n');
    Ok(xml)
}

fn header(changeset: &Changeset) -> String {
    let mut parts = vec![
        format!("changeset {}", changeset.id),
        format!("kind {}", changeset.kind),
        format!("commit {}", changeset.source_commit),
        format!("digest {}", changeset.digest),
    ];
    if let Some(at) = changeset.created_at {
        parts.push(format!("created {}", at.to_rfc3339()));
    }
    format!(" {} ", parts.join("; "))
}

/// `--` may not appear inside an XML comment.
fn comment_text(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains("--") {
        out = out.replace("--", "- -");
    }
    out
}

fn write_change_set(w: &mut XmlWriter, stmt: &ChangeStatement, author: &str) -> Result<(), WriteError> {
    let id = stmt.id.to_string();
    let start = BytesStart::new("changeSet").with_attributes([("id", id.as_str()), ("author", author)]);
    w.write_event(Event::Start(start))?;
    write_cypher(w, &stmt.cypher)?;
    match stmt.rollback.as_deref() {
        None => {}
        Some([]) => w.write_event(Event::Empty(BytesStart::new("rollback")))?,
        Some(texts) => {
            w.write_event(Event::Start(BytesStart::new("rollback")))?;
            for text in texts {
                write_cypher(w, text)?;
            }
            w.write_event(Event::End(BytesEnd::new("rollback")))?;
        }
    }
    w.write_event(Event::End(BytesEnd::new("changeSet")))?;
    Ok(())
}

/// Only `<`, `>` and `&` are escaped so quotes in Cypher literals stay readable.
fn write_cypher(w: &mut XmlWriter, text: &str) -> Result<(), WriteError> {
    w.write_event(Event::Start(BytesStart::new("neo4j:cypher")))?;
    w.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
    w.write_event(Event::End(BytesEnd::new("neo4j:cypher")))?;
    Ok(())
}

// ============================================================================
// Renumbering
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbered {
    pub xml: String,
    /// The id the next appended changelog should start from.
    pub next_id: u32,
}

/// Rewrite every `changeSet` id sequentially from `start`; all other events
/// pass through untouched.
pub fn renumber_changelog(xml: &str, start: u32) -> Result<Renumbered, WriteError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut w = Writer::new(Vec::new());
    let mut next_id = start;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"changeSet" => {
                w.write_event(Event::Start(renumbered(&e, next_id)?))?;
                next_id += 1;
            }
            Event::Empty(e) if e.name().as_ref() == b"changeSet" => {
                w.write_event(Event::Empty(renumbered(&e, next_id)?))?;
                next_id += 1;
            }
            event => {
                if let Event::Start(e) = &event {
                    seen_root |= e.name().as_ref() == b"databaseChangeLog";
                }
                w.write_event(event)?;
            }
        }
    }
    if !seen_root {
        return Err(WriteError::Malformed(
            "no databaseChangeLog element".to_string(),
        ));
    }
    Ok(Renumbered {
        xml: String::from_utf8(w.into_inner())?,
        next_id,
    })
}

fn renumbered(e: &BytesStart<'_>, id: u32) -> Result<BytesStart<'static>, WriteError> {
    let id = id.to_string();
    let mut out = BytesStart::new("changeSet");
    let mut has_id = false;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == b"id" {
            out.push_attribute(("id", id.as_str()));
            has_id = true;
        } else {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    if !has_id {
        return Err(WriteError::Malformed("changeSet without id".to_string()));
    }
    Ok(out)
}
