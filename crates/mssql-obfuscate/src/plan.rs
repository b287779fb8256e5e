//! XML execution-plan obfuscation.
//!
//! SQL Server hands back execution plans as XML documents whose attributes
//! embed raw SQL fragments and literal values. The rewriter streams the
//! document token by token, mirrors every token into the output, and
//! rewrites only the targeted attribute values through the SQL obfuscator.
//! No DOM is built; element structure and order are preserved.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, BytesText, Event};

use crate::ObfuscateError;
use crate::sql::obfuscate_sql;

/// Attribute names whose values are rewritten through the SQL obfuscator.
pub const OBFUSCATED_PLAN_ATTRIBUTES: &[&str] = &[
    "StatementText",
    "ConstValue",
    "ScalarString",
    "ParameterCompiledValue",
];

fn is_target_attribute(local_name: &[u8]) -> bool {
    OBFUSCATED_PLAN_ATTRIBUTES
        .iter()
        .any(|name| name.as_bytes() == local_name)
}

/// Rewrite a start or empty-element tag, obfuscating targeted attributes.
///
/// An attribute whose value fails to obfuscate keeps its original value;
/// the plan as a whole must still serialize.
fn rewrite_element(element: &BytesStart<'_>) -> Result<BytesStart<'static>, ObfuscateError> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut rewritten = BytesStart::new(name);

    for attribute in element.attributes() {
        let attribute =
            attribute.map_err(|e| ObfuscateError::MalformedPlan(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| ObfuscateError::MalformedPlan(e.to_string()))?
            .into_owned();

        if is_target_attribute(attribute.key.local_name().as_ref()) {
            match obfuscate_sql(&value) {
                Ok(obfuscated) => {
                    rewritten.push_attribute((key.as_str(), obfuscated.as_str()));
                    continue;
                }
                Err(error) => {
                    tracing::warn!(
                        attribute = %key,
                        %error,
                        "failed to obfuscate plan attribute, keeping original value"
                    );
                }
            }
        }
        rewritten.push_attribute((key.as_str(), value.as_str()));
    }

    Ok(rewritten)
}

/// Obfuscate SQL embedded in an XML execution plan.
///
/// Streams the input; the only clean terminator is end of input. A
/// malformed token is a hard error, and the caller is expected to drop the
/// plan attribute rather than emit a partial document.
pub fn obfuscate_xml_plan(raw_plan: &str) -> Result<String, ObfuscateError> {
    let mut reader = Reader::from_str(raw_plan);
    reader.config_mut().check_end_names = true;
    let mut writer = Writer::new(Vec::new());

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ObfuscateError::MalformedPlan(e.to_string()))?;

        let written = match event {
            Event::Eof => break,
            Event::Start(element) => writer.write_event(Event::Start(rewrite_element(&element)?)),
            Event::Empty(element) => writer.write_event(Event::Empty(rewrite_element(&element)?)),
            Event::Text(text) => {
                let unescaped = text
                    .unescape()
                    .map_err(|e| ObfuscateError::MalformedPlan(e.to_string()))?;
                writer.write_event(Event::Text(BytesText::new(unescaped.trim())))
            }
            other => writer.write_event(other),
        };
        written.map_err(|e| ObfuscateError::PlanSerialize(e.to_string()))?;
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ObfuscateError::PlanSerialize(e.to_string()))
}
