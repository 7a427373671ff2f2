//! Prints a bearer token for local testing:
//! `issue_token <email> <user|business|admin>`.

use flexpass_membership_service::auth::{Role, TokenSettings};
use flexpass_membership_service::config::TokenConfig;

fn parse_role(value: &str) -> Result<Role, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "user" => Ok(Role::User),
        "business" => Ok(Role::Business),
        "admin" => Ok(Role::Admin),
        other => Err(format!("unknown role '{other}', expected user, business or admin")),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let email = args
        .next()
        .or_else(|| std::env::var("EMAIL").ok())
        .ok_or("usage: issue_token <email> <role>")?;
    let role = args
        .next()
        .or_else(|| std::env::var("ROLE").ok())
        .unwrap_or_else(|| "user".to_string());

    let config = TokenConfig::from_env()?;
    let settings = TokenSettings::new(config.jwt_secret, config.jwt_expiration_hours);
    let token = settings.issue(&email, parse_role(&role)?)?;
    println!("{token}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("Admin").unwrap(), Role::Admin);
        assert_eq!(parse_role("business").unwrap(), Role::Business);
        assert!(parse_role("owner").is_err());
    }
}
