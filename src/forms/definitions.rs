use super::{Field, FieldKind, Form, Lookup, Rule};

pub const PICTURE_EXTENSIONS: &[&str] = &["png", "jpg"];

fn username() -> Field {
    Field::new("username", "Username", FieldKind::Text)
        .rule(Rule::Required)
        .rule(Rule::Length { min: 2, max: 32 })
}

fn email() -> Field {
    Field::new("email", "Email", FieldKind::Email)
        .rule(Rule::Required)
        .rule(Rule::Email)
}

fn new_password() -> [Field; 2] {
    [
        Field::new("password", "Password", FieldKind::Password)
            .rule(Rule::Required)
            .rule(Rule::Length { min: 8, max: 255 })
            .rule(Rule::StrongPassword),
        Field::new("confirm_password", "Confirm Password", FieldKind::Password)
            .rule(Rule::Required)
            .rule(Rule::EqualTo("password")),
    ]
}

pub fn registration() -> Form {
    let [password, confirm] = new_password();
    Form {
        title: "Join Today",
        submit: "Sign Up",
        fields: vec![
            username().lookup(Lookup::UsernameFree),
            email().lookup(Lookup::EmailFree),
            password,
            confirm,
        ],
    }
}

pub fn login() -> Form {
    Form {
        title: "Log In",
        submit: "Login",
        fields: vec![
            email(),
            Field::new("password", "Password", FieldKind::Password).rule(Rule::Required),
            Field::new("remember", "Remember Me", FieldKind::Checkbox),
        ],
    }
}

/// Uniqueness lookups here are skipped for values equal to the editing user's own.
pub fn account_update() -> Form {
    Form {
        title: "Account Info",
        submit: "Update",
        fields: vec![
            username().lookup(Lookup::UsernameFree),
            email().lookup(Lookup::EmailFree),
            Field::new("picture", "Update Profile Picture", FieldKind::File)
                .rule(Rule::AllowedExtensions(PICTURE_EXTENSIONS)),
        ],
    }
}

pub fn request_reset() -> Form {
    Form {
        title: "Reset Password",
        submit: "Request Password Reset",
        fields: vec![email().lookup(Lookup::EmailRegistered)],
    }
}

pub fn reset_password() -> Form {
    Form {
        title: "Reset Password",
        submit: "Reset Password",
        fields: new_password().into(),
    }
}
