//! Namelist header writer/reader.

use super::quote_string;
use crate::codec::unquote_string;
use crate::error::{SdsError, SdsResult};
use crate::layout::{
    ArrayDef, AssociateDef, ByteOrder, ColumnDef, ColumnMemoryMode, CommonDef, DataMode, DataModeKind, Layout,
    ParameterDef,
};
use crate::stream::SdsStream;
use crate::types::Type;
use std::collections::HashMap;

const SITE_WRITE: &str = "header::write";
const SITE_READ: &str = "header::read";

/// Emits the full header: version line, optional endianness/fixed-rowcount
/// comments, `&description`, one block per definition, and `&data`.
pub fn write_header(stream: &mut dyn SdsStream, layout: &Layout) -> SdsResult<()> {
    let version = layout.version();
    stream.puts(&format!("SDS{version}\n"))?;

    if layout.data_mode.mode == DataModeKind::Binary {
        match layout.byte_order.unwrap_or(ByteOrder::native()) {
            ByteOrder::Big => stream.puts("!# big-endian\n")?,
            ByteOrder::Little => stream.puts("!# little-endian\n")?,
        }
    }
    if layout.data_mode.fixed_row_count {
        stream.puts("!# fixed-rowcount\n")?;
    }

    if layout.description.is_some() || layout.contents.is_some() {
        let mut fields = Vec::new();
        if let Some(d) = &layout.description {
            fields.push(("text".to_string(), quote_string(d)));
        }
        if let Some(c) = &layout.contents {
            fields.push(("contents".to_string(), quote_string(c)));
        }
        write_block(stream, "description", &fields)?;
    }

    for p in &layout.parameters {
        write_block(stream, "parameter", &parameter_fields(p))?;
    }
    for a in &layout.arrays {
        write_block(stream, "array", &array_fields(a))?;
    }
    for c in &layout.columns {
        write_block(stream, "column", &column_fields(c))?;
    }
    for a in &layout.associates {
        write_block(stream, "associate", &associate_fields(a))?;
    }

    write_block(stream, "data", &data_fields(&layout.data_mode))?;
    Ok(())
}

fn write_block(stream: &mut dyn SdsStream, kind: &str, fields: &[(String, String)]) -> SdsResult<()> {
    let mut line = format!("&{kind} ");
    let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    line.push_str(&rendered.join(", "));
    line.push_str(" &end\n");
    stream.puts(&line)
}

fn common_fields(common: &CommonDef) -> Vec<(String, String)> {
    let mut fields = vec![("name".to_string(), common.name.clone())];
    if let Some(s) = &common.symbol {
        fields.push(("symbol".to_string(), quote_string(s)));
    }
    if let Some(u) = &common.units {
        fields.push(("units".to_string(), quote_string(u)));
    }
    if let Some(d) = &common.description {
        fields.push(("description".to_string(), quote_string(d)));
    }
    if let Some(f) = &common.format_string {
        fields.push(("format_string".to_string(), quote_string(f)));
    }
    fields
}

fn parameter_fields(p: &ParameterDef) -> Vec<(String, String)> {
    let mut fields = common_fields(&p.common);
    fields.push(("type".to_string(), p.ty.name().to_string()));
    if let Some(v) = &p.fixed_value {
        fields.push(("fixed_value".to_string(), quote_string(v)));
    }
    fields
}

fn column_fields(c: &ColumnDef) -> Vec<(String, String)> {
    let mut fields = common_fields(&c.common);
    fields.push(("type".to_string(), c.ty.name().to_string()));
    if c.field_length != 0 {
        fields.push(("field_length".to_string(), c.field_length.to_string()));
    }
    fields
}

fn array_fields(a: &ArrayDef) -> Vec<(String, String)> {
    let mut fields = common_fields(&a.common);
    fields.push(("type".to_string(), a.ty.name().to_string()));
    fields.push(("dimensions".to_string(), a.dimensions.to_string()));
    if a.field_length != 0 {
        fields.push(("field_length".to_string(), a.field_length.to_string()));
    }
    if let Some(g) = &a.group_name {
        fields.push(("group_name".to_string(), quote_string(g)));
    }
    fields
}

fn associate_fields(a: &AssociateDef) -> Vec<(String, String)> {
    let mut fields = common_fields(&a.common);
    fields.push(("filename".to_string(), quote_string(&a.filename)));
    fields.push(("path".to_string(), quote_string(&a.path)));
    fields.push(("contents".to_string(), quote_string(&a.contents)));
    fields.push(("sdds".to_string(), if a.sdds { "1" } else { "0" }.to_string()));
    fields
}

fn data_fields(mode: &DataMode) -> Vec<(String, String)> {
    let mut fields = vec![(
        "mode".to_string(),
        match mode.mode {
            DataModeKind::Ascii => "ascii".to_string(),
            DataModeKind::Binary => "binary".to_string(),
        },
    )];
    if mode.lines_per_row > 1 {
        fields.push(("lines_per_row".to_string(), mode.lines_per_row.to_string()));
    }
    if mode.no_row_counts {
        fields.push(("no_row_counts".to_string(), "1".to_string()));
    }
    if mode.column_major {
        fields.push(("column_major_order".to_string(), "1".to_string()));
    }
    if mode.fixed_row_count {
        fields.push(("fixed_row_count".to_string(), "1".to_string()));
    }
    fields
}

/// Parses a namelist-syntax header back into a `Layout`. Tolerant of key
/// order within a block; unknown keys fail with `BadField`.
pub fn read_header(stream: &mut dyn SdsStream) -> SdsResult<Layout> {
    let mut line = String::new();
    stream.gets(&mut line)?;
    let line = line.trim();
    if !line.starts_with("SDS") {
        return Err(SdsError::bad_field(SITE_READ, "missing SDS version line"));
    }
    let _version: u8 = line[3..]
        .trim()
        .parse()
        .map_err(|_| SdsError::bad_field(SITE_READ, "invalid version number"))?;

    let mut layout = Layout::new();
    let mut declared_byte_order = None;
    let mut declared_fixed_row_count = false;

    let mut buffer = String::new();
    loop {
        buffer.clear();
        let n = stream.gets(&mut buffer)?;
        if n == 0 {
            break;
        }
        let trimmed = buffer.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix("!#") {
            match comment.trim() {
                "big-endian" => declared_byte_order = Some(ByteOrder::Big),
                "little-endian" => declared_byte_order = Some(ByteOrder::Little),
                "fixed-rowcount" => declared_fixed_row_count = true,
                _ => {}
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('&') {
            let (kind, fields) = parse_block(rest, stream)?;
            apply_block(&mut layout, &kind, fields)?;
            if kind == "data" {
                break;
            }
            continue;
        }
        return Err(SdsError::bad_field(SITE_READ, format!("unexpected header line: {trimmed}")));
    }

    layout.byte_order = declared_byte_order;
    layout.data_mode.fixed_row_count = layout.data_mode.fixed_row_count || declared_fixed_row_count;
    Ok(layout)
}

/// Reads one `&kind key=value, ... &end` block, continuing across lines
/// until ` &end` is seen.
fn parse_block(
    first_line_rest: &str,
    stream: &mut dyn SdsStream,
) -> SdsResult<(String, HashMap<String, String>)> {
    let mut text = first_line_rest.to_string();
    while !text.contains("&end") {
        let mut next = String::new();
        if stream.gets(&mut next)? == 0 {
            return Err(SdsError::bad_field(SITE_READ, "unterminated namelist block"));
        }
        text.push(' ');
        text.push_str(next.trim());
    }
    let text = text.replace("&end", "");
    let mut chars = text.trim().char_indices();
    let kind_end = chars
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(text.trim().len());
    let kind = text.trim()[..kind_end].to_string();
    let rest = text.trim()[kind_end..].trim();
    let fields = parse_fields(rest)?;
    Ok((kind, fields))
}

/// Splits `key=value, key=value, ...` respecting double-quoted values that
/// may themselves contain commas.
fn parse_fields(s: &str) -> SdsResult<HashMap<String, String>> {
    let mut fields = HashMap::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == ',') {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        let key_start = i;
        while i < chars.len() && chars[i] != '=' {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect::<String>().trim().to_string();
        if key.is_empty() {
            break;
        }
        i += 1; // skip '='
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let value_start = i;
        let value = if i < chars.len() && chars[i] == '"' {
            i += 1;
            let start = i;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if chars[i] == '"' {
                    break;
                }
                i += 1;
            }
            let raw: String = chars[start..i].iter().collect();
            i += 1; // closing quote
            unquote_string(&format!("\"{raw}\""))
        } else {
            while i < chars.len() && chars[i] != ',' {
                i += 1;
            }
            chars[value_start..i].iter().collect::<String>().trim().to_string()
        };
        fields.insert(key, value);
    }
    Ok(fields)
}

const DESCRIPTION_KEYS: &[&str] = &["text", "contents"];
const COMMON_KEYS: &[&str] = &["name", "symbol", "units", "description", "format_string"];
const PARAMETER_KEYS: &[&str] = &["type", "fixed_value"];
const COLUMN_KEYS: &[&str] = &["type", "field_length"];
const ARRAY_KEYS: &[&str] = &["type", "field_length", "dimensions", "group_name"];
const ASSOCIATE_KEYS: &[&str] = &["filename", "path", "contents", "sdds"];
const DATA_KEYS: &[&str] = &[
    "mode",
    "lines_per_row",
    "no_row_counts",
    "column_major_order",
    "fixed_row_count",
];

fn all_keys(specific: &[&'static str]) -> Vec<&'static str> {
    COMMON_KEYS.iter().chain(specific.iter()).copied().collect()
}

fn check_known_keys(fields: &HashMap<String, String>, allowed: &[&str], site: &'static str) -> SdsResult<()> {
    for key in fields.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(SdsError::bad_field(site, format!("unknown key '{key}'")));
        }
    }
    Ok(())
}

fn apply_block(layout: &mut Layout, kind: &str, fields: HashMap<String, String>) -> SdsResult<()> {
    match kind {
        "description" => {
            check_known_keys(&fields, DESCRIPTION_KEYS, SITE_READ)?;
            layout.description = fields.get("text").cloned();
            layout.contents = fields.get("contents").cloned();
        }
        "parameter" => {
            check_known_keys(&fields, &all_keys(PARAMETER_KEYS), SITE_READ)?;
            let common = common_from_fields(&fields, SITE_READ)?;
            let ty = type_from_fields(&fields, SITE_READ)?;
            layout.define_parameter(ParameterDef {
                common,
                ty,
                field_length: field_length(&fields),
                fixed_value: fields.get("fixed_value").cloned(),
            })?;
        }
        "column" => {
            check_known_keys(&fields, &all_keys(COLUMN_KEYS), SITE_READ)?;
            let common = common_from_fields(&fields, SITE_READ)?;
            let ty = type_from_fields(&fields, SITE_READ)?;
            layout.define_column(ColumnDef {
                common,
                ty,
                field_length: field_length(&fields),
            })?;
        }
        "array" => {
            check_known_keys(&fields, &all_keys(ARRAY_KEYS), SITE_READ)?;
            let common = common_from_fields(&fields, SITE_READ)?;
            let ty = type_from_fields(&fields, SITE_READ)?;
            let dimensions = fields
                .get("dimensions")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            layout.define_array(ArrayDef {
                common,
                ty,
                field_length: field_length(&fields),
                dimensions,
                group_name: fields.get("group_name").cloned(),
            })?;
        }
        "associate" => {
            check_known_keys(&fields, &all_keys(ASSOCIATE_KEYS), SITE_READ)?;
            let common = common_from_fields(&fields, SITE_READ)?;
            layout.define_associate(AssociateDef {
                common,
                filename: fields.get("filename").cloned().unwrap_or_default(),
                path: fields.get("path").cloned().unwrap_or_default(),
                contents: fields.get("contents").cloned().unwrap_or_default(),
                sdds: fields.get("sdds").map(|s| s == "1").unwrap_or(false),
            })?;
        }
        "data" => {
            check_known_keys(&fields, DATA_KEYS, SITE_READ)?;
            layout.data_mode.mode = match fields.get("mode").map(String::as_str) {
                Some("binary") => DataModeKind::Binary,
                Some("ascii") | None => DataModeKind::Ascii,
                Some(other) => return Err(SdsError::bad_field(SITE_READ, format!("unknown data mode '{other}'"))),
            };
            layout.data_mode.lines_per_row = fields
                .get("lines_per_row")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            layout.data_mode.no_row_counts = fields.get("no_row_counts").map(|s| s == "1").unwrap_or(false);
            layout.data_mode.column_major = fields.get("column_major_order").map(|s| s == "1").unwrap_or(false);
            layout.data_mode.fixed_row_count = fields.get("fixed_row_count").map(|s| s == "1").unwrap_or(false);
            layout.data_mode.column_memory_mode = ColumnMemoryMode::default();
        }
        other => {
            return Err(SdsError::bad_field(SITE_READ, format!("unknown block kind '{other}'")));
        }
    }
    Ok(())
}

fn common_from_fields(fields: &HashMap<String, String>, site: &'static str) -> SdsResult<CommonDef> {
    let name = fields
        .get("name")
        .cloned()
        .ok_or_else(|| SdsError::bad_field(site, "missing required 'name' field"))?;
    if name.is_empty() {
        return Err(SdsError::bad_field(site, "'name' must be non-empty"));
    }
    Ok(CommonDef {
        name,
        symbol: fields.get("symbol").cloned(),
        units: fields.get("units").cloned(),
        description: fields.get("description").cloned(),
        format_string: fields.get("format_string").cloned(),
    })
}

fn type_from_fields(fields: &HashMap<String, String>, site: &'static str) -> SdsResult<Type> {
    let name = fields
        .get("type")
        .ok_or_else(|| SdsError::bad_field(site, "missing required 'type' field"))?;
    Type::from_name(name).ok_or_else(|| SdsError::bad_field(site, format!("unknown type '{name}'")))
}

fn field_length(fields: &HashMap<String, String>) -> i32 {
    fields.get("field_length").and_then(|s| s.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::mem::MemStream;

    #[test]
    fn quote_string_wraps_values_needing_it() {
        assert_eq!(quote_string("hello, world"), "\"hello, world\"");
        assert_eq!(quote_string("quote \"x\""), "\"quote \\\"x\\\"\"");
        assert_eq!(quote_string("plain"), "plain");
    }

    #[test]
    fn header_round_trip_single_parameter_and_column() {
        let mut layout = Layout::new();
        layout
            .define_parameter(ParameterDef {
                common: CommonDef {
                    name: "p".into(),
                    description: Some("hello, world".into()),
                    ..Default::default()
                },
                ty: Type::Double,
                field_length: 0,
                fixed_value: None,
            })
            .unwrap();
        layout
            .define_column(ColumnDef {
                common: CommonDef {
                    name: "x".into(),
                    ..Default::default()
                },
                ty: Type::Int32,
                field_length: 0,
            })
            .unwrap();

        let mut stream = MemStream::new();
        write_header(&mut stream, &layout).unwrap();
        let bytes = stream.into_bytes();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("SDS1\n"));

        let mut read_stream = MemStream::from_bytes(bytes);
        let parsed = read_header(&mut read_stream).unwrap();
        assert_eq!(parsed.parameters.len(), 1);
        assert_eq!(parsed.parameters[0].common.name, "p");
        assert_eq!(parsed.parameters[0].common.description.as_deref(), Some("hello, world"));
        assert_eq!(parsed.columns.len(), 1);
        assert_eq!(parsed.columns[0].ty, Type::Int32);
    }

    #[test]
    fn unknown_key_in_data_block_is_bad_field() {
        let mut stream = MemStream::new();
        stream.puts("SDS1\n&data bogus_key=weird &end\n").unwrap();
        let bytes = stream.into_bytes();
        let mut read_stream = MemStream::from_bytes(bytes);
        assert!(read_header(&mut read_stream).is_err());
    }
}
