use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize)]
pub struct TotpSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
    pub issuer: String,
    pub label: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TotpVerifyRequest {
    #[validate(length(min = 6, max = 10))]
    pub code: String,
}
