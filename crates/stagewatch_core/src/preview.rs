const TRUNCATED_MARKER: &str = "\n[truncated]";
pub const MAX_PREVIEW_CONTENT: usize = 40_960;

/// Content shown when browsing a generated file; long files are cut on a char boundary.
pub fn prepare_preview(content: &str) -> String {
    if content.len() <= MAX_PREVIEW_CONTENT {
        return content.to_string();
    }
    let mut end = MAX_PREVIEW_CONTENT;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATED_MARKER}", &content[..end])
}

#[cfg(test)]
mod tests {
    use super::{prepare_preview, MAX_PREVIEW_CONTENT};

    #[test]
    fn short_content_kept_as_is() {
        assert_eq!(prepare_preview("print(1)"), "print(1)");
    }

    #[test]
    fn truncated_content_appends_marker() {
        let content = "a".repeat(MAX_PREVIEW_CONTENT + 128);
        let preview = prepare_preview(&content);
        assert!(preview.ends_with("\n[truncated]"));
        assert_eq!(preview.len(), MAX_PREVIEW_CONTENT + "\n[truncated]".len());
    }

    #[test]
    fn multibyte_boundary_respected() {
        let mut content = "a".repeat(MAX_PREVIEW_CONTENT - 1);
        content.push_str("ééé");
        let preview = prepare_preview(&content);
        assert!(preview.starts_with(&"a".repeat(MAX_PREVIEW_CONTENT - 1)));
        assert!(!preview.contains('é'));
    }
}
