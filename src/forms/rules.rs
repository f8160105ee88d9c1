use validator::ValidateEmail;

use super::Submission;

/// A check that only looks at the submitted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Present and not just whitespace. Stops the field's remaining checks.
    Required,
    /// Bounds in characters, inclusive.
    Length { min: usize, max: usize },
    Email,
    /// Must equal the value of the named field.
    EqualTo(&'static str),
    /// At least one upper case letter, one lower case letter and one digit.
    StrongPassword,
    /// Uploaded file name must end in one of these extensions (case-insensitive).
    /// An absent upload passes.
    AllowedExtensions(&'static [&'static str]),
}

pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const EMAIL_MESSAGE: &str = "Invalid email address.";
pub const STRONG_PASSWORD_MESSAGE: &str =
    "Password must contain at least one number, one capital letter and one lower case letter.";

impl Rule {
    pub fn check(&self, field: &str, submission: &Submission) -> Result<(), String> {
        let value = submission.value(field);
        match *self {
            Rule::Required => {
                if value.trim().is_empty() {
                    return Err(REQUIRED_MESSAGE.to_string());
                }
            }
            Rule::Length { min, max } => {
                let len = value.chars().count();
                if len < min || len > max {
                    return Err(format!("Field must be between {} and {} characters long.", min, max));
                }
            }
            Rule::Email => {
                if !value.to_string().validate_email() {
                    return Err(EMAIL_MESSAGE.to_string());
                }
            }
            Rule::EqualTo(other) => {
                if value != submission.value(other) {
                    return Err(format!("Field must be equal to {}.", other));
                }
            }
            Rule::StrongPassword => {
                if !is_strong_password(value) {
                    return Err(STRONG_PASSWORD_MESSAGE.to_string());
                }
            }
            Rule::AllowedExtensions(allowed) => {
                if let Some(upload) = submission.file(field) {
                    if !has_extension(&upload.filename, allowed) {
                        return Err(format!(
                            "File does not have an approved extension: {}",
                            allowed.join(", ")
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn is_strong_password(value: &str) -> bool {
    value.chars().any(char::is_uppercase)
        && value.chars().any(char::is_lowercase)
        && value.chars().any(|c| c.is_ascii_digit())
}

pub fn extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn has_extension(filename: &str, allowed: &[&str]) -> bool {
    extension(filename).is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
}
