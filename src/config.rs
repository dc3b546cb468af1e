use std::env;

const DEFAULT_TRANSFER_INSTRUCTIONS: &str =
    "Send the transfer to the store account and upload the receipt for this payment id.";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub currency: String,
    /// Card processor secret. When absent the in-memory gateway is used.
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    /// Handed to clients that confirm card payments themselves.
    pub stripe_publishable_key: Option<String>,
    pub receipt_dir: String,
    pub transfer_instructions: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let currency = env::var("PAYMENT_CURRENCY")
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|_| "brl".to_string());
        let stripe_secret_key = env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let stripe_publishable_key = env::var("STRIPE_PUBLISHABLE_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let stripe_api_base = env::var("STRIPE_API_BASE")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let receipt_dir = env::var("RECEIPT_DIR").unwrap_or_else(|_| "receipts".to_string());
        let transfer_instructions = env::var("BANK_TRANSFER_INSTRUCTIONS")
            .unwrap_or_else(|_| DEFAULT_TRANSFER_INSTRUCTIONS.to_string());
        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            currency,
            stripe_secret_key,
            stripe_api_base,
            stripe_publishable_key,
            receipt_dir,
            transfer_instructions,
        })
    }
}
