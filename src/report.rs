//! Rendering and writing the final sender → targets report.

use std::path::Path;

use crate::config::OutputFormat;
use crate::scan::types::GlobalResult;

/// One block per sender: `sender:` then one target per line, blocks
/// separated by a blank line.
pub fn render_text(result: &GlobalResult) -> String {
    let mut out = String::new();
    for (sender, targets) in result.iter() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(sender);
        out.push_str(":\n");
        for target in targets {
            out.push_str(target);
            out.push('\n');
        }
    }
    out
}

/// Pretty JSON object: sender → array of targets.
pub fn render_json(result: &GlobalResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

pub fn render(result: &GlobalResult, format: OutputFormat) -> Result<String, std::io::Error> {
    match format {
        OutputFormat::Text => Ok(render_text(result)),
        OutputFormat::Json => render_json(result).map_err(std::io::Error::other),
    }
}

/// Render `result` and write it to `path`, replacing any existing file.
pub async fn write_report(
    path: &Path,
    result: &GlobalResult,
    format: OutputFormat,
) -> Result<(), std::io::Error> {
    let body = render(result, format)?;
    tokio::fs::write(path, body).await?;
    tracing::info!(path = %path.display(), senders = result.len(), "Report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::aggregate::aggregate;
    use crate::scan::types::LocalResult;

    fn sample() -> GlobalResult {
        let mut local = LocalResult::new();
        local.record("b@y.com".into(), vec!["http://y.com/u3".to_string()]);
        local.record(
            "a@x.com".into(),
            vec!["http://x.com/u2".to_string(), "http://x.com/u1".to_string()],
        );
        aggregate(vec![local])
    }

    #[test]
    fn text_blocks_sorted_and_separated() {
        assert_eq!(
            render_text(&sample()),
            "a@x.com:\nhttp://x.com/u1\nhttp://x.com/u2\n\nb@y.com:\nhttp://y.com/u3\n"
        );
    }

    #[test]
    fn text_empty_result() {
        assert_eq!(render_text(&GlobalResult::default()), "");
    }

    #[test]
    fn json_object() {
        let json: serde_json::Value = serde_json::from_str(&render_json(&sample()).unwrap()).unwrap();
        assert_eq!(json["b@y.com"][0], "http://y.com/u3");
        assert_eq!(json["a@x.com"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");
        write_report(&path, &sample(), OutputFormat::Text).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("a@x.com:\n"));
    }
}
