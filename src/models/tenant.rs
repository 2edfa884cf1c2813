//! Tenant context and the bearer-token claims it is resolved from

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Acting tenant for one call into the scheduling services.
/// Resolved by the caller for every request and never cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    /// Operator identity, used for log lines only
    pub actor: String,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, actor: impl Into<String>) -> Self {
        Self {
            tenant_id,
            actor: actor.into(),
        }
    }
}

/// JWT claims issued by the external auth layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantClaims {
    pub sub: String,
    pub tenant_id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl TenantClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn context(&self) -> TenantContext {
        TenantContext::new(self.tenant_id, self.sub.clone())
    }
}
