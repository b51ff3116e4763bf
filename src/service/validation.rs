use crate::error::ValidationError;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 20;
const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_PASSWORD_LENGTH: usize = 30;

fn has_invalid_characters(s: &str) -> bool {
    s.chars().any(|c| !c.is_alphanumeric())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if has_invalid_characters(username) {
        return Err(ValidationError::UsernameInvalidCharacters);
    }
    match username.len() {
        n if n < MIN_USERNAME_LENGTH => Err(ValidationError::UsernameTooShort),
        n if n > MAX_USERNAME_LENGTH => Err(ValidationError::UsernameTooLong),
        _ => Ok(()),
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if has_invalid_characters(password) {
        return Err(ValidationError::PasswordInvalidCharacters);
    }
    match password.len() {
        n if n < MIN_PASSWORD_LENGTH => Err(ValidationError::PasswordTooShort),
        n if n > MAX_PASSWORD_LENGTH => Err(ValidationError::PasswordTooLong),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert_eq!(validate_username("alice"), Ok(()));
        assert_eq!(validate_username("al"), Err(ValidationError::UsernameTooShort));
        assert_eq!(
            validate_username("a".repeat(21).as_str()),
            Err(ValidationError::UsernameTooLong)
        );
        assert_eq!(
            validate_username("alice!"),
            Err(ValidationError::UsernameInvalidCharacters)
        );
        assert_eq!(
            validate_username("a b"),
            Err(ValidationError::UsernameInvalidCharacters)
        );
    }

    #[test]
    fn lengths_are_counted_in_bytes() {
        // 11 characters, 22 bytes
        assert_eq!(
            validate_username(&"é".repeat(11)),
            Err(ValidationError::UsernameTooLong)
        );
        // 2 characters, 4 bytes
        assert_eq!(validate_username("éé"), Ok(()));
    }

    #[test]
    fn passwords() {
        assert_eq!(validate_password("secret123"), Ok(()));
        assert_eq!(validate_password("abc"), Err(ValidationError::PasswordTooShort));
        assert_eq!(
            validate_password("x".repeat(31).as_str()),
            Err(ValidationError::PasswordTooLong)
        );
        assert_eq!(
            validate_password("secret-123"),
            Err(ValidationError::PasswordInvalidCharacters)
        );
    }
}
