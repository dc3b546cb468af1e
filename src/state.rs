use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, create_orm_conn},
    notify::{LogNotifier, Notifier},
    payments::{MockGateway, PaymentGateway, StripeGateway},
    storage::{LocalReceiptStore, ReceiptStore},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub jwt_secret: Arc<str>,
    pub currency: Arc<str>,
    pub transfer_instructions: Arc<str>,
    pub publishable_key: Option<Arc<str>>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub receipts: Arc<dyn ReceiptStore>,
}

impl AppState {
    pub fn from_config(config: &AppConfig, pool: DbPool) -> Self {
        let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
            Some(key) => Arc::new(StripeGateway::new(config.stripe_api_base.clone(), key.clone())),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set, card payments use the in-memory gateway");
                Arc::new(MockGateway::new())
            }
        };

        Self {
            orm: create_orm_conn(&pool),
            pool,
            jwt_secret: config.jwt_secret.as_str().into(),
            currency: config.currency.as_str().into(),
            transfer_instructions: config.transfer_instructions.as_str().into(),
            publishable_key: config.stripe_publishable_key.as_deref().map(Arc::from),
            gateway,
            notifier: Arc::new(LogNotifier),
            receipts: Arc::new(LocalReceiptStore::new(config.receipt_dir.clone())),
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_receipts(mut self, receipts: Arc<dyn ReceiptStore>) -> Self {
        self.receipts = receipts;
        self
    }
}
