use serde::{Deserialize, Serialize};

/// The authenticated user as held in memory and persisted to storage.
///
/// Field names on the wire match the record the web client has always
/// written under `userData`, so existing stored sessions stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    #[serde(rename = "compcode", deserialize_with = "deserialize_string_or_number")]
    pub company_code: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub browser: String,
}

impl UserRecord {
    /// Replace the access token after a successful refresh
    pub fn with_token(mut self, token: String) -> Self {
        self.token = token;
        self
    }

    /// Name to greet the user with, falling back to the email address
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.email
        } else {
            &self.full_name
        }
    }
}

/// Account flavour sent with the login request.
///
/// Usernames that look like an email address log in as `S` accounts,
/// everything else as `A` accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Email,
    Local,
}

impl AccountType {
    pub fn from_username(username: &str) -> Self {
        if username.contains('@') {
            AccountType::Email
        } else {
            AccountType::Local
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AccountType::Email => "S",
            AccountType::Local => "A",
        }
    }
}

// Backend ids come back as either JSON strings or numbers
pub(crate) fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumberVisitor;

    impl<'de> de::Visitor<'de> for StringOrNumberVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_from_username() {
        assert_eq!(AccountType::from_username("admin@x.com").code(), "S");
        assert_eq!(AccountType::from_username("admin").code(), "A");
        assert_eq!(AccountType::from_username("@").code(), "S");
        assert_eq!(AccountType::from_username("").code(), "A");
    }

    #[test]
    fn test_parse_stored_record() {
        let json = r#"{"compcode":7,"id":"42","user_type":"A","fullName":"Jane Doe","email":"jane@x.com","token":"t1","refreshToken":"r1","ip":"","browser":""}"#;
        let record: UserRecord = serde_json::from_str(json).expect("Failed to parse record JSON");
        assert_eq!(record.company_code, "7");
        assert_eq!(record.id, "42");
        assert_eq!(record.refresh_token, "r1");
        assert_eq!(record.display_name(), "Jane Doe");
    }

    #[test]
    fn test_record_requires_tokens() {
        let json = r#"{"compcode":"01","id":1,"token":"t1"}"#;
        assert!(serde_json::from_str::<UserRecord>(json).is_err());
    }

    #[test]
    fn test_record_serializes_original_keys() {
        let record = UserRecord {
            id: "1".into(),
            company_code: "01".into(),
            user_type: "A".into(),
            full_name: String::new(),
            email: "a@b.c".into(),
            token: "t".into(),
            refresh_token: "r".into(),
            ip: String::new(),
            browser: String::new(),
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["compcode"], "01");
        assert_eq!(value["refreshToken"], "r");
        assert_eq!(record.display_name(), "a@b.c");
    }
}
