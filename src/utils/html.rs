// src/utils/html.rs

/// Clean HTML content using the ammonia library.
///
/// Used on free text that is stored and later rendered to students, such as
/// a badge's earned description. Safe tags (like <b>, <p>) are kept; <script>
/// and <style> are dropped together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
