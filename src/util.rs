use std::path::Path;

/// Truncate text to at most `max_chars` characters.
pub fn truncate_string(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

/// Render a command line for status output.
pub fn format_command_line(command: &Path, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(command.display().to_string());
    parts.extend(args.iter().cloned());
    shell_words::join(&parts)
}
