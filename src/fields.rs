use crate::classifier::CompiledProfile;

/// Border line used above and below the key-field summary.
pub const BLOCK_BORDER: &str = "----------------------------------------";

/// Render the key-field summary block for a profile.
///
/// Field rules run against the ORIGINAL raw body, not the cleaned one, so a
/// value sitting inside boilerplate the cleaner later removes is still
/// captured. A field is included only when its regex matched and capture
/// group 1 is non-empty after trimming. With at least one field the result is
/// a bordered block followed by a blank line; with none it is the empty
/// string and the composition step emits nothing.
pub fn summary_block(raw_body: &str, profile: &CompiledProfile) -> String {
    let mut lines = Vec::new();
    for (label, pattern) in &profile.field_rules {
        if let Some(value) = pattern
            .captures(raw_body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|v| !v.is_empty())
        {
            lines.push(format!("{label}: {value}"));
        }
    }

    if lines.is_empty() {
        return String::new();
    }

    let mut block = String::with_capacity(lines.len() * 40 + BLOCK_BORDER.len() * 2 + 4);
    block.push_str(BLOCK_BORDER);
    block.push('\n');
    for line in lines {
        block.push_str(&line);
        block.push('\n');
    }
    block.push_str(BLOCK_BORDER);
    block.push_str("\n\n");
    block
}
