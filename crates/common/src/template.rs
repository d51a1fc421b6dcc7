//! Output-pattern templates (`{target_name}-{index}{target_extension}`)
//!
//! Placeholders are `{name}`; `{{` and `}}` produce literal braces. A placeholder
//! that has no value is an error, never an empty substitution.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown placeholder '{{{0}}}' in output pattern")]
    UnknownPlaceholder(String),

    #[error("Unbalanced brace at position {0} in output pattern")]
    UnbalancedBrace(usize),
}

/// Substitute `values` into `template`.
pub fn format_output_pattern(
    template: &str,
    values: &HashMap<&str, String>,
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len() + 32);
    let mut chars = template.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    output.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    if inner == '{' {
                        return Err(TemplateError::UnbalancedBrace(position));
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBrace(position));
                }
                let value = values
                    .get(name.as_str())
                    .ok_or(TemplateError::UnknownPlaceholder(name))?;
                output.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    output.push('}');
                } else {
                    return Err(TemplateError::UnbalancedBrace(position));
                }
            }
            _ => output.push(ch),
        }
    }

    Ok(output)
}
