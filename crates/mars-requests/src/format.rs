//! Text and JSON rendering of requests.

use std::io::{self, Write};

use forecast_common::{Result, RetrieveRequest};
use serde::Serialize;

/// MARS-style block:
///
/// ```text
/// retrieve,
///    date=20230101,
///    param=2t/msl
/// ```
///
/// Keys are sorted; list values are sorted except geometry keys.
pub fn render_pretty(verb: &str, request: &RetrieveRequest) -> String {
    let mut lines = vec![verb.to_string()];
    for (key, values) in request.canonical() {
        lines.push(format!("{}={}", key, values.join("/")));
    }
    lines.join(",\n   ")
}

/// Write each request as a block followed by a blank line.
pub fn write_pretty<W: Write>(out: &mut W, verb: &str, requests: &[RetrieveRequest]) -> io::Result<()> {
    for request in requests {
        writeln!(out, "{}", render_pretty(verb, request))?;
        writeln!(out)?;
    }
    Ok(())
}

/// JSON array indented by four spaces.
pub fn render_json_pretty(requests: &[RetrieveRequest]) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    requests.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// JSON array on a single line, without spaces.
pub fn render_json_compact(requests: &[RetrieveRequest]) -> Result<String> {
    Ok(serde_json::to_string(requests)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RetrieveRequest {
        RetrieveRequest::new()
            .with("param", vec!["msl", "2t"])
            .with("levtype", "sfc")
            .with("area", vec![90.0, 0.0, -90.0, 360.0])
            .with("date", 20230101i64)
    }

    #[test]
    fn test_pretty_block() {
        assert_eq!(
            render_pretty("retrieve", &request()),
            "retrieve,\n   area=90/0/-90/360,\n   date=20230101,\n   levtype=sfc,\n   param=2t/msl"
        );
    }

    #[test]
    fn test_write_pretty_blank_line_after_each() {
        let mut out = Vec::new();
        let r = RetrieveRequest::new().with("date", 20230101i64);
        write_pretty(&mut out, "archive", &[r.clone(), r]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "archive,\n   date=20230101\n\narchive,\n   date=20230101\n\n"
        );
    }

    #[test]
    fn test_json_forms() {
        let r = RetrieveRequest::new().with("levtype", "sfc").with("param", vec!["2t"]);
        assert_eq!(
            render_json_compact(&[r.clone()]).unwrap(),
            r#"[{"levtype":"sfc","param":["2t"]}]"#
        );
        let pretty = render_json_pretty(&[r]).unwrap();
        assert!(pretty.starts_with("[\n    {\n        \"levtype\": \"sfc\""));
    }
}
