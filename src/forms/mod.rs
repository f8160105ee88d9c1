//! Declarative form validation.
//!
//! A [`Form`] is an ordered table of fields; each field carries its static
//! [`Rule`]s and at most one directory [`Lookup`]. Every field is checked so
//! all errors can be shown together. Per field, the static rules run first and
//! the lookup only runs when they all passed, so malformed input never reaches
//! the directory.

pub mod definitions;
pub mod rules;

use std::collections::{BTreeMap, HashMap};

use crate::db::{User, UserDirectory};
use crate::error::AppError;

pub use definitions::{account_update, login, registration, request_reset, reset_password};
pub use rules::Rule;

pub const USERNAME_TAKEN: &str = "Username already in use. Try another";
pub const EMAIL_TAKEN: &str = "Email already in use. Try another";
pub const EMAIL_UNKNOWN: &str = "Account with that email does not exist. Register first";

/// A file received through a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: &str, bytes: Vec<u8>) -> Self {
        Self { filename: filename.to_string(), bytes }
    }
}

/// Submitted form data: text values plus any uploaded files.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    values: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl Submission {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values, files: HashMap::new() }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    pub fn with_file(mut self, field: &str, upload: Upload) -> Self {
        self.files.insert(field.to_string(), upload);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), value.into());
    }

    /// The submitted text, or `""` when the field was not sent.
    pub fn value(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn file(&self, field: &str) -> Option<&Upload> {
        self.files.get(field)
    }

    pub fn take_file(&mut self, field: &str) -> Option<Upload> {
        self.files.remove(field)
    }

    /// Checkbox semantics: absent or unrecognised means `false`.
    pub fn flag(&self, field: &str) -> bool {
        matches!(
            self.value(field).to_ascii_lowercase().as_str(),
            "on" | "true" | "y" | "yes" | "1"
        )
    }
}

/// A check against the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    UsernameFree,
    EmailFree,
    EmailRegistered,
}

impl Lookup {
    async fn check(&self, value: &str, ctx: &ValidationContext<'_>) -> Result<Option<&'static str>, AppError> {
        let message = match self {
            Lookup::UsernameFree => {
                if ctx.editing.is_some_and(|u| u.username == value) {
                    return Ok(None);
                }
                ctx.directory.find_by_username(value).await?.map(|_| USERNAME_TAKEN)
            }
            Lookup::EmailFree => {
                if ctx.editing.is_some_and(|u| u.email == value) {
                    return Ok(None);
                }
                ctx.directory.find_by_email(value).await?.map(|_| EMAIL_TAKEN)
            }
            Lookup::EmailRegistered => match ctx.directory.find_by_email(value).await? {
                Some(_) => None,
                None => Some(EMAIL_UNKNOWN),
            },
        };
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    Password,
    Checkbox,
    File,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub rules: Vec<Rule>,
    pub lookup: Option<Lookup>,
}

impl Field {
    pub fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self { name, label, kind, rules: Vec::new(), lookup: None }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules.contains(&Rule::Required)
    }
}

#[derive(Debug, Clone)]
pub struct Form {
    pub title: &'static str,
    pub submit: &'static str,
    pub fields: Vec<Field>,
}

impl Form {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_uploads(&self) -> bool {
        self.fields.iter().any(|f| f.kind == FieldKind::File)
    }

    /// Runs every field's rules. Empty errors means the submission is accepted.
    pub async fn validate(&self, submission: &Submission, ctx: &ValidationContext<'_>) -> Result<FieldErrors, AppError> {
        let mut errors = FieldErrors::default();

        for field in &self.fields {
            for rule in &field.rules {
                if let Err(message) = rule.check(field.name, submission) {
                    errors.add(field.name, message);
                    if *rule == Rule::Required {
                        break;
                    }
                }
            }
            if errors.has(field.name) {
                continue;
            }

            if let Some(lookup) = field.lookup {
                if let Some(message) = lookup.check(submission.value(field.name), ctx).await? {
                    errors.add(field.name, message);
                }
            }
        }

        Ok(errors)
    }
}

/// Read-only collaborators for directory lookups.
pub struct ValidationContext<'a> {
    directory: &'a dyn UserDirectory,
    /// The signed-in user whose own values may be resubmitted unchanged.
    editing: Option<&'a User>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(directory: &'a dyn UserDirectory) -> Self {
        Self { directory, editing: None }
    }

    pub fn editing(directory: &'a dyn UserDirectory, user: &'a User) -> Self {
        Self { directory, editing: Some(user) }
    }
}

/// Error messages keyed by field name, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    async fn directory_with_alice() -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let alice = User::new("alice".into(), "alice@x.com".into(), "hash".into(), "default.jpg".into());
        UserDirectory::create(&store, &alice).await.unwrap();
        (store, alice)
    }

    fn registration_data(username: &str, email: &str, password: &str, confirm: &str) -> Submission {
        Submission::from_pairs([
            ("username", username),
            ("email", email),
            ("password", password),
            ("confirm_password", confirm),
        ])
    }

    #[tokio::test]
    async fn test_valid_registration() {
        let (store, _) = directory_with_alice().await;
        let ctx = ValidationContext::new(&store);
        let data = registration_data("bob", "bob@x.com", "Passw0rd", "Passw0rd");

        let errors = registration().validate(&data, &ctx).await.unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[tokio::test]
    async fn test_all_failing_fields_are_reported() {
        let (store, _) = directory_with_alice().await;
        let ctx = ValidationContext::new(&store);
        let data = registration_data("alice", "not-an-email", "short", "other");

        let errors = registration().validate(&data, &ctx).await.unwrap();
        assert_eq!(errors.get("username"), [USERNAME_TAKEN.to_string()]);
        assert_eq!(errors.get("email"), [rules::EMAIL_MESSAGE.to_string()]);
        assert_eq!(
            errors.get("password"),
            [
                "Field must be between 8 and 255 characters long.".to_string(),
                rules::STRONG_PASSWORD_MESSAGE.to_string(),
            ]
        );
        assert_eq!(errors.get("confirm_password"), ["Field must be equal to password.".to_string()]);
    }

    #[tokio::test]
    async fn test_required_stops_the_chain() {
        let (store, _) = directory_with_alice().await;
        let ctx = ValidationContext::new(&store);
        let errors = registration().validate(&Submission::default(), &ctx).await.unwrap();

        assert_eq!(errors.get("username"), [rules::REQUIRED_MESSAGE.to_string()]);
        assert_eq!(errors.get("password"), [rules::REQUIRED_MESSAGE.to_string()]);
        assert_eq!(errors.len(), 4);
    }

    #[tokio::test]
    async fn test_lookup_skipped_when_static_rules_fail() {
        let (store, _) = directory_with_alice().await;
        let ctx = ValidationContext::new(&store);
        // "a" is too short; the directory is never asked whether it is taken.
        let data = registration_data("a", "alice@x.com", "Passw0rd", "Passw0rd");

        let errors = registration().validate(&data, &ctx).await.unwrap();
        assert_eq!(errors.get("username"), ["Field must be between 2 and 32 characters long.".to_string()]);
        assert_eq!(errors.get("email"), [EMAIL_TAKEN.to_string()]);
    }

    #[tokio::test]
    async fn test_account_update_allows_unchanged_values() {
        let (store, alice) = directory_with_alice().await;
        let ctx = ValidationContext::editing(&store, &alice);
        let data = Submission::from_pairs([("username", "alice"), ("email", "alice@x.com")]);

        let errors = account_update().validate(&data, &ctx).await.unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[tokio::test]
    async fn test_account_update_rejects_someone_elses_values() {
        let (store, _) = directory_with_alice().await;
        let bob = User::new("bob".into(), "bob@x.com".into(), "hash".into(), "default.jpg".into());
        UserDirectory::create(&store, &bob).await.unwrap();

        let ctx = ValidationContext::editing(&store, &bob);
        let data = Submission::from_pairs([("username", "alice"), ("email", "alice@x.com")]);

        let errors = account_update().validate(&data, &ctx).await.unwrap();
        assert_eq!(errors.get("username"), [USERNAME_TAKEN.to_string()]);
        assert_eq!(errors.get("email"), [EMAIL_TAKEN.to_string()]);
    }

    #[tokio::test]
    async fn test_request_reset_needs_known_email() {
        let (store, _) = directory_with_alice().await;
        let ctx = ValidationContext::new(&store);

        let known = Submission::from_pairs([("email", "alice@x.com")]);
        assert!(request_reset().validate(&known, &ctx).await.unwrap().is_empty());

        let unknown = Submission::from_pairs([("email", "carol@x.com")]);
        let errors = request_reset().validate(&unknown, &ctx).await.unwrap();
        assert_eq!(errors.get("email"), [EMAIL_UNKNOWN.to_string()]);
    }

    #[tokio::test]
    async fn test_login_form_does_not_consult_directory() {
        let store = MemoryStore::new();
        let ctx = ValidationContext::new(&store);
        let data = Submission::from_pairs([("email", "ghost@x.com"), ("password", "x")]);
        assert!(login().validate(&data, &ctx).await.unwrap().is_empty());
    }

    #[test]
    fn test_flag_values() {
        assert!(Submission::from_pairs([("remember", "on")]).flag("remember"));
        assert!(Submission::from_pairs([("remember", "TRUE")]).flag("remember"));
        assert!(!Submission::from_pairs([("remember", "off")]).flag("remember"));
        assert!(!Submission::default().flag("remember"));
    }
}
