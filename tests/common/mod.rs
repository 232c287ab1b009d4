#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ticketing_core::adapters::{InMemoryProductRepository, InMemoryTransactionRepository};
use ticketing_core::domain::{NewTransaction, Principal, Product, Role, Transaction, TransactionStatus};
use ticketing_core::health::DependencyChecker;
use ticketing_core::middleware::auth::{Claims, JwtValidator};
use ticketing_core::ports::{
    Customer, GatewayError, PaymentGateway, RepositoryError, RepositoryResult,
    TransactionRepository,
};
use ticketing_core::use_cases::CheckoutService;
use ticketing_core::{AppState, NotificationSettings};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVER_KEY: &str = "SB-Mid-server-test";
pub const BUDGET: Duration = Duration::from_secs(5);

pub fn product(id: i64, stock: i64, price: i64) -> Product {
    let now = Utc::now();
    Product {
        id,
        name: format!("Concert {id}"),
        description: "Front row".to_string(),
        price: BigDecimal::from(price),
        stock,
        image_url: "image/default.jpg".to_string(),
        start_date: None,
        end_date: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn transaction(id: i64, product_id: i64, status: TransactionStatus) -> Transaction {
    let now = Utc::now();
    Transaction {
        id,
        product_id,
        user_id: 7,
        amount: BigDecimal::from(100),
        status,
        payment_url: Some(format!("https://pay.example/{id}")),
        created_at: now,
        updated_at: now,
    }
}

pub fn customer(id: i64) -> Principal {
    Principal {
        id,
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        phone: "08123456789".to_string(),
        role: Role::Customer,
    }
}

pub fn admin(id: i64) -> Principal {
    Principal {
        role: Role::Admin,
        ..customer(id)
    }
}

/// Signs a bearer token the way the login service does.
pub fn token_for(principal: &Principal) -> String {
    let claims = Claims {
        id: principal.id,
        username: principal.username.clone(),
        email: principal.email.clone(),
        phone: principal.phone.clone(),
        roles: match principal.role {
            Role::Admin => "admin".to_string(),
            Role::Customer => "user".to_string(),
        },
        exp: Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

#[derive(Debug, Clone)]
pub struct GatewayCall {
    pub order_id: String,
    pub gross_amount: BigDecimal,
    pub customer: Customer,
    /// Status of the stored transaction at the moment the gateway was called.
    pub stored_status: Option<TransactionStatus>,
}

/// Payment gateway stand-in that records its calls.
pub struct StubGateway {
    transactions: Option<InMemoryTransactionRepository>,
    calls: Mutex<Vec<GatewayCall>>,
    fail: bool,
    delay: Option<Duration>,
    cancel_while_pending: bool,
}

impl StubGateway {
    pub fn ok() -> Self {
        Self {
            transactions: None,
            calls: Mutex::new(Vec::new()),
            fail: false,
            delay: None,
            cancel_while_pending: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok()
        }
    }

    /// Cancels the transaction while the session is being created, as a
    /// concurrent sweep would.
    pub fn cancelling() -> Self {
        Self {
            cancel_while_pending: true,
            ..Self::ok()
        }
    }

    /// Lets the stub look up the stored transaction when it is called.
    pub fn observing(mut self, transactions: InMemoryTransactionRepository) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn url_for(order_id: &str) -> String {
        format!("https://app.sandbox.midtrans.com/snap/v2/vtweb/{order_id}")
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_payment_session(
        &self,
        order_id: &str,
        gross_amount: &BigDecimal,
        customer: &Customer,
    ) -> Result<String, GatewayError> {
        let stored_status = match (&self.transactions, order_id.parse::<i64>()) {
            (Some(repo), Ok(id)) => repo.read_by_id(id).await.ok().map(|tx| tx.status),
            _ => None,
        };
        self.calls.lock().unwrap().push(GatewayCall {
            order_id: order_id.to_string(),
            gross_amount: gross_amount.clone(),
            customer: customer.clone(),
            stored_status,
        });

        if self.cancel_while_pending {
            if let (Some(repo), Ok(id)) = (&self.transactions, order_id.parse::<i64>()) {
                repo.cancel_and_release(id).await.unwrap();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(GatewayError::Rejected {
                status: 503,
                message: "gateway unavailable".to_string(),
            });
        }
        Ok(Self::url_for(order_id))
    }
}

/// Wraps the in-memory store and fails chosen operations, the way a dropped
/// connection aborts a database transaction before commit.
pub struct FlakyTransactionRepository {
    pub inner: InMemoryTransactionRepository,
    fail_create: bool,
    cancel_failures: AtomicUsize,
}

impl FlakyTransactionRepository {
    pub fn failing_create(inner: InMemoryTransactionRepository) -> Self {
        Self {
            inner,
            fail_create: true,
            cancel_failures: AtomicUsize::new(0),
        }
    }

    pub fn failing_cancels(inner: InMemoryTransactionRepository, times: usize) -> Self {
        Self {
            inner,
            fail_create: false,
            cancel_failures: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl TransactionRepository for FlakyTransactionRepository {
    async fn create(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        if self.fail_create {
            return Err(RepositoryError::Unavailable("connection refused".to_string()));
        }
        self.inner.create(tx).await
    }

    async fn create_reserving(&self, tx: &NewTransaction) -> RepositoryResult<Transaction> {
        if self.fail_create {
            return Err(RepositoryError::Unavailable("connection refused".to_string()));
        }
        self.inner.create_reserving(tx).await
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<()> {
        self.inner.update(tx).await
    }

    async fn update_status(
        &self,
        id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> RepositoryResult<bool> {
        self.inner.update_status(id, from, to).await
    }

    async fn cancel_and_release(&self, id: i64) -> RepositoryResult<bool> {
        let remaining = self.cancel_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.cancel_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        self.inner.cancel_and_release(id).await
    }

    async fn read_by_id(&self, id: i64) -> RepositoryResult<Transaction> {
        self.inner.read_by_id(id).await
    }

    async fn list_abandoned(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Transaction>> {
        self.inner.list_abandoned(cutoff).await
    }
}

pub struct Fixture {
    pub products: InMemoryProductRepository,
    pub transactions: InMemoryTransactionRepository,
    pub gateway: Arc<StubGateway>,
    pub service: Arc<CheckoutService>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_gateway(StubGateway::ok())
    }

    pub fn with_gateway(gateway: StubGateway) -> Self {
        Self::with_budget(gateway, BUDGET)
    }

    pub fn with_budget(gateway: StubGateway, budget: Duration) -> Self {
        let products = InMemoryProductRepository::new();
        let transactions = InMemoryTransactionRepository::with_ledger(products.clone());
        let gateway = Arc::new(gateway.observing(transactions.clone()));
        let service = Arc::new(CheckoutService::new(
            Arc::new(transactions.clone()),
            Arc::new(products.clone()),
            gateway.clone(),
            budget,
        ));
        Self {
            products,
            transactions,
            gateway,
            service,
        }
    }

    pub async fn stock_of(&self, product_id: i64) -> i64 {
        self.products.stock_of(product_id).await.unwrap()
    }

    pub fn app_state(&self, verify_signature: bool) -> AppState {
        AppState {
            checkout: self.service.clone(),
            products: Arc::new(self.products.clone()),
            inventory: Arc::new(self.products.clone()),
            transactions: Arc::new(self.transactions.clone()),
            jwt: Arc::new(JwtValidator::new(JWT_SECRET)),
            notifications: NotificationSettings {
                server_key: SERVER_KEY.to_string(),
                verify_signature,
            },
            health_checkers: Arc::from(Vec::<Arc<dyn DependencyChecker>>::new()),
            start_time: Instant::now(),
            log_request_body: true,
        }
    }
}
