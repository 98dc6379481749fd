// src/credential.rs
//
// Temporary storage credentials issued by the job API for one run.

use std::fmt;

use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use serde::Serialize;

use crate::constants::CREDENTIAL_REGION;

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredential {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// `WITH CREDENTIALS` string used by UNLOAD and COPY.
    pub fn redshift_credential_string(&self) -> String {
        let mut s = format!(
            "aws_access_key_id={};aws_secret_access_key={}",
            self.access_key_id, self.secret_access_key
        );
        if let Some(token) = &self.session_token {
            s.push_str(";token=");
            s.push_str(token);
        }
        s
    }

    /// Bind these credentials and the fixed region onto a storage client
    /// configuration. Only the returned builder sees them.
    pub fn attach_to(&self, builder: S3ConfigBuilder) -> S3ConfigBuilder {
        let creds = Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            self.session_token.clone(),
            None,
            "parsed-names-temporary",
        );
        builder
            .credentials_provider(creds)
            .region(Region::new(CREDENTIAL_REGION))
    }
}

/// First quarter of the value followed by `XXXX`.
fn obfuscate(value: &str) -> String {
    let keep: String = value.chars().take(value.chars().count() / 4).collect();
    format!("{keep}XXXX")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Preview {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
}

impl fmt::Display for AwsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let non_empty = |s: &str| (!s.is_empty()).then(|| obfuscate(s));
        let preview = Preview {
            access_key_id: non_empty(&self.access_key_id),
            secret_access_key: non_empty(&self.secret_access_key),
            session_token: self.session_token.as_deref().and_then(non_empty),
        };
        let json = serde_json::to_string(&preview).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// Debug goes through the obfuscated rendering as well.
impl fmt::Debug for AwsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AwsCredential({self})")
    }
}
