//! Field checks shared by the services. Each check pushes a human readable
//! message; an empty list means the input is acceptable.

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 3;

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2 && !host.ends_with('.'),
        None => false,
    }
}

pub fn check_email(email: &str, errors: &mut Vec<String>) {
    if !is_valid_email(email) {
        errors.push("Invalid email address".to_string());
    }
}

pub fn check_password(password: &str, errors: &mut Vec<String>) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        ));
    }
}

pub fn check_name(name: &str, errors: &mut Vec<String>) {
    if name.trim().chars().count() < MIN_NAME_LEN {
        errors.push(format!(
            "Name must be at least {} characters long",
            MIN_NAME_LEN
        ));
    }
}

pub fn check_required(field: &str, value: &str, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(format!("{} is required", field));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user@example.com", true)]
    #[case("first.last@sub.example.org", true)]
    #[case("user@example", false)]
    #[case("@example.com", false)]
    #[case("user@.com", false)]
    #[case("user@@example.com", false)]
    #[case("us er@example.com", false)]
    #[case("", false)]
    fn email_shapes(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[test]
    fn collects_every_failure() {
        let mut errors = Vec::new();
        check_email("nope", &mut errors);
        check_password("12345", &mut errors);
        check_name("  ab ", &mut errors);
        check_required("Title", "   ", &mut errors);

        assert_eq!(errors.len(), 4);
        assert_eq!(errors[3], "Title is required");
    }
}
