//! Database service for income-service.
//!
//! All SQL lives here. Invoice generation and payment recording each run in
//! a single transaction; every other operation is a standalone statement
//! against the pool.

use crate::models::{
    cash_account_for_method, receivable_account_code, CreateAddon, CreatePackage, CreatePurchase,
    CreateSubscription, CustomerAddonPurchase, CustomerSubscription, GenerateInvoice,
    GeneratedInvoice, Invoice, InvoiceItem, InvoicePayment, InvoiceStatus, ItemType,
    JournalSource, ListInvoicesFilter, ListSubscriptionsFilter, PaymentOutcome, PurchaseStatus,
    RecordPayment, ServiceAddon, ServicePackage, SubscriptionWithPackage, UnbilledPurchase,
    ACCOUNT_IVA_PAYABLE, ACCOUNT_REVENUE,
};
use crate::services::metrics::{DB_QUERY_DURATION, INVOICES_GENERATED_TOTAL, PAYMENTS_TOTAL};
use crate::services::tax::{self, calculate_invoice_totals};
use backoffice_core::error::AppError;
use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use std::time::Duration as StdDuration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Read-only aggregates for the income dashboard.
#[derive(Debug, Clone, Copy)]
pub struct DashboardMetrics {
    pub mrr: Decimal,
    pub total_outstanding: Decimal,
    pub revenue_this_month: Decimal,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "income-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(StdDuration::from_secs(30))
            .idle_timeout(StdDuration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Package Operations
    // -------------------------------------------------------------------------

    /// Create a new service package.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_package(&self, input: &CreatePackage) -> Result<ServicePackage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_package"])
            .start_timer();

        let package_id = Uuid::new_v4();
        let package = sqlx::query_as::<_, ServicePackage>(
            r#"
            INSERT INTO service_packages (
                package_id, name, description, base_price, billing_cycle,
                posts_per_month, stories_per_week, reels_per_month,
                platforms_included, features, display_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING package_id, name, description, base_price, billing_cycle,
                posts_per_month, stories_per_week, reels_per_month,
                platforms_included, features, display_order, is_active, created_utc
            "#,
        )
        .bind(package_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.base_price)
        .bind(input.billing_cycle.as_str())
        .bind(input.posts_per_month)
        .bind(input.stories_per_week)
        .bind(input.reels_per_month)
        .bind(&input.platforms_included)
        .bind(&input.features)
        .bind(input.display_order)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Package '{}' already exists", input.name))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create package: {}", e)),
        })?;

        timer.observe_duration();

        info!(package_id = %package.package_id, name = %package.name, "Package created");

        Ok(package)
    }

    /// List active packages ordered by display_order then price.
    #[instrument(skip(self))]
    pub async fn list_active_packages(&self, limit: i64) -> Result<Vec<ServicePackage>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_packages"])
            .start_timer();

        let packages = sqlx::query_as::<_, ServicePackage>(
            r#"
            SELECT package_id, name, description, base_price, billing_cycle,
                posts_per_month, stories_per_week, reels_per_month,
                platforms_included, features, display_order, is_active, created_utc
            FROM service_packages
            WHERE is_active = TRUE
            ORDER BY display_order, base_price
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list packages: {}", e)))?;

        timer.observe_duration();

        Ok(packages)
    }

    // -------------------------------------------------------------------------
    // Add-on Operations
    // -------------------------------------------------------------------------

    /// Create a new add-on.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_addon(&self, input: &CreateAddon) -> Result<ServiceAddon, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_addon"])
            .start_timer();

        let addon_id = Uuid::new_v4();
        let addon = sqlx::query_as::<_, ServiceAddon>(
            r#"
            INSERT INTO service_addons (
                addon_id, name, category, price, pricing_type, billing_frequency, requires_approval
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING addon_id, name, category, price, pricing_type, billing_frequency,
                requires_approval, is_active, created_utc
            "#,
        )
        .bind(addon_id)
        .bind(&input.name)
        .bind(&input.category)
        .bind(input.price)
        .bind(input.pricing_type.as_str())
        .bind(input.billing_frequency.as_str())
        .bind(input.requires_approval)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Add-on '{}' already exists", input.name))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create add-on: {}", e)),
        })?;

        timer.observe_duration();

        info!(addon_id = %addon.addon_id, name = %addon.name, "Add-on created");

        Ok(addon)
    }

    /// List active add-ons, optionally filtered by category.
    #[instrument(skip(self))]
    pub async fn list_active_addons(
        &self,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ServiceAddon>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_addons"])
            .start_timer();

        let addons = sqlx::query_as::<_, ServiceAddon>(
            r#"
            SELECT addon_id, name, category, price, pricing_type, billing_frequency,
                requires_approval, is_active, created_utc
            FROM service_addons
            WHERE is_active = TRUE
              AND ($1::varchar IS NULL OR category = $1)
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(category)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list add-ons: {}", e)))?;

        timer.observe_duration();

        Ok(addons)
    }

    // -------------------------------------------------------------------------
    // Subscription Operations
    // -------------------------------------------------------------------------

    /// Create a subscription. The next billing date is the start date plus
    /// one calendar month, computed once and never advanced automatically.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id, package_id = %input.package_id))]
    pub async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<CustomerSubscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let package: Option<ServicePackage> = sqlx::query_as(
            r#"
            SELECT package_id, name, description, base_price, billing_cycle,
                posts_per_month, stories_per_week, reels_per_month,
                platforms_included, features, display_order, is_active, created_utc
            FROM service_packages
            WHERE package_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(input.package_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get package: {}", e)))?;

        if package.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Package {} not found",
                input.package_id
            )));
        }

        let next_billing_date = input
            .start_date
            .checked_add_months(Months::new(1))
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid start date")))?;

        let subscription_id = Uuid::new_v4();
        let subscription = sqlx::query_as::<_, CustomerSubscription>(
            r#"
            INSERT INTO customer_subscriptions (
                subscription_id, customer_id, package_id, status, start_date,
                next_billing_date, custom_monthly_price, notes
            )
            VALUES ($1, $2, $3, 'active', $4, $5, $6, $7)
            RETURNING subscription_id, customer_id, package_id, status, start_date,
                next_billing_date, custom_monthly_price, notes, created_utc
            "#,
        )
        .bind(subscription_id)
        .bind(input.customer_id)
        .bind(input.package_id)
        .bind(input.start_date)
        .bind(next_billing_date)
        .bind(input.custom_monthly_price)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", input.customer_id))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create subscription: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            subscription_id = %subscription.subscription_id,
            customer_id = subscription.customer_id,
            "Subscription created"
        );

        Ok(subscription)
    }

    /// List subscriptions joined with package and customer names.
    #[instrument(skip(self, filter))]
    pub async fn list_subscriptions(
        &self,
        filter: &ListSubscriptionsFilter,
    ) -> Result<Vec<SubscriptionWithPackage>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_subscriptions"])
            .start_timer();

        let status_str = filter.status.map(|s| s.as_str().to_string());

        let subscriptions = sqlx::query_as::<_, SubscriptionWithPackage>(
            r#"
            SELECT s.subscription_id, s.customer_id, c.name AS customer_name,
                s.package_id, p.name AS package_name, s.status, s.start_date,
                s.next_billing_date, s.custom_monthly_price,
                COALESCE(s.custom_monthly_price, p.base_price) AS effective_price,
                s.notes, s.created_utc
            FROM customer_subscriptions s
            JOIN service_packages p ON p.package_id = s.package_id
            JOIN customers c ON c.customer_id = s.customer_id
            WHERE ($1::bigint IS NULL OR s.customer_id = $1)
              AND ($2::varchar IS NULL OR s.status = $2)
            ORDER BY s.created_utc DESC
            LIMIT $3
            "#,
        )
        .bind(filter.customer_id)
        .bind(&status_str)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list subscriptions: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscriptions)
    }

    // -------------------------------------------------------------------------
    // Add-on Purchase Operations
    // -------------------------------------------------------------------------

    /// Record an add-on purchase with snapshot pricing. The unit price is
    /// copied from the add-on at purchase time; later catalog changes do not
    /// affect existing purchases.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id, addon_id = %input.addon_id))]
    pub async fn create_purchase(
        &self,
        input: &CreatePurchase,
    ) -> Result<CustomerAddonPurchase, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_purchase"])
            .start_timer();

        let addon: Option<ServiceAddon> = sqlx::query_as(
            r#"
            SELECT addon_id, name, category, price, pricing_type, billing_frequency,
                requires_approval, is_active, created_utc
            FROM service_addons
            WHERE addon_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(input.addon_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get add-on: {}", e)))?;

        let addon = addon.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Add-on {} not found", input.addon_id))
        })?;

        let unit_price = addon.price;
        let total_price = unit_price * Decimal::from(input.quantity);

        let purchase_id = Uuid::new_v4();
        let purchase = sqlx::query_as::<_, CustomerAddonPurchase>(
            r#"
            INSERT INTO customer_addon_purchases (
                purchase_id, customer_id, addon_id, subscription_id, project_id,
                description, quantity, unit_price, total_price, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING purchase_id, customer_id, addon_id, subscription_id, project_id,
                description, quantity, unit_price, total_price, status,
                billed_invoice_item_id, created_utc
            "#,
        )
        .bind(purchase_id)
        .bind(input.customer_id)
        .bind(input.addon_id)
        .bind(input.subscription_id)
        .bind(input.project_id)
        .bind(&input.description)
        .bind(input.quantity)
        .bind(unit_price)
        .bind(total_price)
        .bind(PurchaseStatus::Approved.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", input.customer_id))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create purchase: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            purchase_id = %purchase.purchase_id,
            total_price = %purchase.total_price,
            "Add-on purchase recorded"
        );

        Ok(purchase)
    }

    /// List a customer's approved purchases that no invoice item references.
    #[instrument(skip(self))]
    pub async fn list_unbilled_purchases(
        &self,
        customer_id: i64,
    ) -> Result<Vec<UnbilledPurchase>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unbilled_purchases"])
            .start_timer();

        let purchases = sqlx::query_as::<_, UnbilledPurchase>(
            r#"
            SELECT cap.purchase_id, cap.addon_id, a.name AS addon_name, cap.description,
                cap.quantity, cap.unit_price, cap.total_price
            FROM customer_addon_purchases cap
            JOIN service_addons a ON a.addon_id = cap.addon_id
            WHERE cap.customer_id = $1
              AND cap.status = 'approved'
              AND cap.billed_invoice_item_id IS NULL
            ORDER BY cap.created_utc
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list unbilled purchases: {}", e))
        })?;

        timer.observe_duration();

        Ok(purchases)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_number, customer_id, subscription_id, invoice_date,
                due_date, billing_period_start, billing_period_end, subtotal, tax_percentage,
                tax_amount, total, amount_paid, status, paid_at, created_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// List invoices, newest first.
    #[instrument(skip(self, filter))]
    pub async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let status_str = filter.status.map(|s| s.as_str().to_string());

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, invoice_number, customer_id, subscription_id, invoice_date,
                due_date, billing_period_start, billing_period_end, subtotal, tax_percentage,
                tax_amount, total, amount_paid, status, paid_at, created_utc
            FROM invoices
            WHERE ($1::bigint IS NULL OR customer_id = $1)
              AND ($2::varchar IS NULL OR status = $2)
            ORDER BY invoice_date DESC, invoice_number DESC
            LIMIT $3
            "#,
        )
        .bind(filter.customer_id)
        .bind(&status_str)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Get the line items of an invoice in display order.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT item_id, invoice_id, item_type, description, quantity, unit_price,
                subtotal, total, reference_id, reference_type, display_order
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY display_order
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice items: {}", e))
        })?;

        timer.observe_duration();

        Ok(items)
    }

    /// Get the payments applied to an invoice, oldest first.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice_payments(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoicePayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, InvoicePayment>(
            r#"
            SELECT payment_id, invoice_id, amount, payment_method, payment_date,
                reference_number, created_utc
            FROM invoice_payments
            WHERE invoice_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice payments: {}", e))
        })?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Generate an invoice for a customer.
    ///
    /// One transaction covers the whole sequence: allocate the year-scoped
    /// invoice number, insert the invoice, assemble the lines in the fixed
    /// order that determines display_order (subscription, then unbilled
    /// add-on purchases, then custom items), recompute the totals from the
    /// line sum, and post the three balanced journal rows. Any failure rolls
    /// everything back.
    #[instrument(skip(self, input), fields(customer_id = input.customer_id))]
    pub async fn generate_invoice(
        &self,
        input: &GenerateInvoice,
        actor_id: i64,
    ) -> Result<GeneratedInvoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["generate_invoice"])
            .start_timer();

        let today = Utc::now().date_naive();
        let year = today.year();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Year-scoped sequential number from an atomic counter upsert; safe
        // under concurrent generation.
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_sequences (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = invoice_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to allocate invoice number: {}", e))
        })?;
        let invoice_number = format!("INV-{}-{:04}", year, sequence);

        // Resolve the subscription before touching the invoice so an id that
        // does not belong to this customer skips the subscription line
        // (logged, not fatal) instead of aborting the generation.
        let mut subscription_line: Option<(Decimal, String)> = None;
        let mut resolved_subscription_id: Option<Uuid> = None;
        if let Some(subscription_id) = input.subscription_id {
            let row: Option<(Option<Decimal>, Decimal, String)> = sqlx::query_as(
                r#"
                SELECT s.custom_monthly_price, p.base_price, p.name
                FROM customer_subscriptions s
                JOIN service_packages p ON p.package_id = s.package_id
                WHERE s.subscription_id = $1 AND s.customer_id = $2
                "#,
            )
            .bind(subscription_id)
            .bind(input.customer_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e))
            })?;

            match row {
                Some((custom_price, base_price, package_name)) => {
                    subscription_line = Some((custom_price.unwrap_or(base_price), package_name));
                    resolved_subscription_id = Some(subscription_id);
                }
                None => {
                    warn!(
                        subscription_id = %subscription_id,
                        customer_id = input.customer_id,
                        "Subscription not found, skipping subscription line"
                    );
                }
            }
        }

        let invoice_id = Uuid::new_v4();
        let due_date = today + Duration::days(15);
        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, invoice_number, customer_id, subscription_id, invoice_date,
                due_date, billing_period_start, billing_period_end, subtotal,
                tax_percentage, tax_amount, total, amount_paid, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, 0, 0, 0, 'draft')
            "#,
        )
        .bind(invoice_id)
        .bind(&invoice_number)
        .bind(input.customer_id)
        .bind(resolved_subscription_id)
        .bind(today)
        .bind(due_date)
        .bind(input.billing_period_start)
        .bind(input.billing_period_end)
        .bind(tax::IVA_RATE_PERCENT)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", input.customer_id))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        let mut display_order = 0i32;

        // 1. Subscription line at the effective price.
        if let (Some((price, package_name)), Some(subscription_id)) =
            (subscription_line, resolved_subscription_id)
        {
            let period = input
                .billing_period_start
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "Mensualidad".to_string());
            let description = format!("{} - {}", package_name, period);

            self.insert_invoice_item(
                &mut tx,
                invoice_id,
                ItemType::Subscription,
                &description,
                Decimal::ONE,
                price,
                price,
                Some(subscription_id),
                Some("subscription"),
                display_order,
            )
            .await?;
            display_order += 1;
        }

        // 2. Unbilled approved add-on purchases. Rows are locked so a
        // concurrent generation cannot bill the same purchase twice.
        if input.include_unbilled_addons {
            let purchases: Vec<UnbilledPurchase> = sqlx::query_as(
                r#"
                SELECT cap.purchase_id, cap.addon_id, a.name AS addon_name, cap.description,
                    cap.quantity, cap.unit_price, cap.total_price
                FROM customer_addon_purchases cap
                JOIN service_addons a ON a.addon_id = cap.addon_id
                WHERE cap.customer_id = $1
                  AND cap.status = 'approved'
                  AND cap.billed_invoice_item_id IS NULL
                ORDER BY cap.created_utc
                FOR UPDATE OF cap
                "#,
            )
            .bind(input.customer_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get unbilled purchases: {}", e))
            })?;

            for purchase in purchases {
                let description = purchase
                    .description
                    .clone()
                    .unwrap_or_else(|| purchase.addon_name.clone());

                let item_id = self
                    .insert_invoice_item(
                        &mut tx,
                        invoice_id,
                        ItemType::Addon,
                        &description,
                        Decimal::from(purchase.quantity),
                        purchase.unit_price,
                        purchase.total_price,
                        Some(purchase.purchase_id),
                        Some("addon"),
                        display_order,
                    )
                    .await?;

                sqlx::query(
                    "UPDATE customer_addon_purchases SET billed_invoice_item_id = $1 WHERE purchase_id = $2",
                )
                .bind(item_id)
                .bind(purchase.purchase_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to mark purchase as billed: {}",
                        e
                    ))
                })?;

                display_order += 1;
            }
        }

        // 3. Caller-supplied custom line items.
        for item in &input.custom_items {
            let line_total = (item.quantity * item.unit_price)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            self.insert_invoice_item(
                &mut tx,
                invoice_id,
                ItemType::Custom,
                &item.description,
                item.quantity,
                item.unit_price,
                line_total,
                None,
                None,
                display_order,
            )
            .await?;
            display_order += 1;
        }

        // Re-sum the lines and write the computed figures back. A lineless
        // invoice sums to zero rather than failing.
        let line_sum: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total), 0) FROM invoice_items WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum line items: {}", e)))?;

        let totals = calculate_invoice_totals(line_sum, Decimal::ZERO);

        sqlx::query(
            "UPDATE invoices SET subtotal = $2, tax_amount = $3, total = $4 WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .bind(totals.subtotal)
        .bind(totals.tax_amount)
        .bind(totals.total)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice totals: {}", e))
        })?;

        // Double-entry postings, balanced by construction:
        // receivable debit = revenue credit + tax credit.
        let receivable = receivable_account_code(input.customer_id);
        let description = format!("Factura {}", invoice_number);
        self.insert_journal_entry(
            &mut tx,
            today,
            &description,
            &receivable,
            totals.total,
            Decimal::ZERO,
            JournalSource::InvoiceGenerated,
            invoice_id,
            actor_id,
        )
        .await?;
        self.insert_journal_entry(
            &mut tx,
            today,
            &description,
            ACCOUNT_REVENUE,
            Decimal::ZERO,
            totals.subtotal,
            JournalSource::InvoiceGenerated,
            invoice_id,
            actor_id,
        )
        .await?;
        self.insert_journal_entry(
            &mut tx,
            today,
            &description,
            ACCOUNT_IVA_PAYABLE,
            Decimal::ZERO,
            totals.tax_amount,
            JournalSource::InvoiceGenerated,
            invoice_id,
            actor_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();
        INVOICES_GENERATED_TOTAL.inc();

        info!(
            invoice_id = %invoice_id,
            invoice_number = %invoice_number,
            total = %totals.total,
            "Invoice generated"
        );

        Ok(GeneratedInvoice {
            invoice_id,
            invoice_number,
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            total: totals.total,
        })
    }

    /// Record a payment against an invoice.
    ///
    /// The invoice row is locked for the duration of the balance check and
    /// update so that concurrent payments serialize; the payment insert, the
    /// invoice update and the two journal rows commit or roll back together.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        input: &RecordPayment,
        actor_id: i64,
    ) -> Result<PaymentOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice: Option<Invoice> = sqlx::query_as(
            r#"
            SELECT invoice_id, invoice_number, customer_id, subscription_id, invoice_date,
                due_date, billing_period_start, billing_period_end, subtotal, tax_percentage,
                tax_amount, total, amount_paid, status, paid_at, created_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        let invoice = invoice.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
        })?;

        if InvoiceStatus::from_string(&invoice.status) == InvoiceStatus::Cancelled {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot record a payment against a cancelled invoice"
            )));
        }

        if input.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }

        let amount_due = invoice.amount_due();
        if input.amount > amount_due {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount {} exceeds amount due {}",
                input.amount,
                amount_due
            )));
        }

        let payment_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO invoice_payments (
                payment_id, invoice_id, amount, payment_method, payment_date, reference_number
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payment_id)
        .bind(invoice_id)
        .bind(input.amount)
        .bind(&input.payment_method)
        .bind(input.payment_date)
        .bind(&input.reference_number)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)))?;

        let new_amount_paid = invoice.amount_paid + input.amount;
        let new_status = InvoiceStatus::after_payment(new_amount_paid, invoice.total);

        sqlx::query(
            r#"
            UPDATE invoices
            SET amount_paid = $2,
                status = $3,
                paid_at = CASE WHEN $3 = 'paid' AND paid_at IS NULL THEN NOW() ELSE paid_at END
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(new_amount_paid)
        .bind(new_status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        // Two balanced postings: money in, receivable down.
        let description = format!("Pago factura {}", invoice.invoice_number);
        let cash_account = cash_account_for_method(&input.payment_method);
        let receivable = receivable_account_code(invoice.customer_id);
        self.insert_journal_entry(
            &mut tx,
            input.payment_date,
            &description,
            cash_account,
            input.amount,
            Decimal::ZERO,
            JournalSource::InvoicePayment,
            invoice_id,
            actor_id,
        )
        .await?;
        self.insert_journal_entry(
            &mut tx,
            input.payment_date,
            &description,
            &receivable,
            Decimal::ZERO,
            input.amount,
            JournalSource::InvoicePayment,
            invoice_id,
            actor_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment: {}", e))
        })?;

        timer.observe_duration();
        PAYMENTS_TOTAL
            .with_label_values(&[&input.payment_method])
            .inc();

        info!(
            payment_id = %payment_id,
            invoice_number = %invoice.invoice_number,
            amount = %input.amount,
            new_status = %new_status.as_str(),
            "Payment recorded"
        );

        Ok(PaymentOutcome {
            payment_id,
            invoice_number: invoice.invoice_number,
            payment_amount: input.amount,
            new_amount_paid,
            amount_remaining: invoice.total - new_amount_paid,
            status: new_status,
        })
    }

    // -------------------------------------------------------------------------
    // Dashboard Operations
    // -------------------------------------------------------------------------

    /// Compute the three dashboard aggregates. Independent read-only queries;
    /// each coalesces to zero when no rows match.
    #[instrument(skip(self))]
    pub async fn dashboard_metrics(&self) -> Result<DashboardMetrics, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dashboard_metrics"])
            .start_timer();

        let mrr: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(COALESCE(s.custom_monthly_price, p.base_price)), 0)
            FROM customer_subscriptions s
            JOIN service_packages p ON p.package_id = s.package_id
            WHERE s.status = 'active'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to compute MRR: {}", e)))?;

        let total_outstanding: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total - amount_paid), 0)
            FROM invoices
            WHERE status NOT IN ('paid', 'cancelled')
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute outstanding: {}", e))
        })?;

        let revenue_this_month: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_paid), 0)
            FROM invoices
            WHERE date_trunc('month', invoice_date) = date_trunc('month', CURRENT_DATE)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute monthly revenue: {}", e))
        })?;

        timer.observe_duration();

        Ok(DashboardMetrics {
            mrr,
            total_outstanding,
            revenue_this_month,
        })
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Insert one invoice line inside the generation transaction. `subtotal`
    /// and `total` are written identically; no per-line discount exists.
    #[allow(clippy::too_many_arguments)]
    async fn insert_invoice_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
        item_type: ItemType,
        description: &str,
        quantity: Decimal,
        unit_price: Decimal,
        total: Decimal,
        reference_id: Option<Uuid>,
        reference_type: Option<&str>,
        display_order: i32,
    ) -> Result<Uuid, AppError> {
        let item_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO invoice_items (
                item_id, invoice_id, item_type, description, quantity, unit_price,
                subtotal, total, reference_id, reference_type, display_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(item_id)
        .bind(invoice_id)
        .bind(item_type.as_str())
        .bind(description)
        .bind(quantity)
        .bind(unit_price)
        .bind(total)
        .bind(total)
        .bind(reference_id)
        .bind(reference_type)
        .bind(display_order)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice item: {}", e))
        })?;

        Ok(item_id)
    }

    /// Append one journal row inside a transaction. Exactly one of
    /// `debit`/`credit` is non-zero.
    #[allow(clippy::too_many_arguments)]
    async fn insert_journal_entry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry_date: NaiveDate,
        description: &str,
        account_code: &str,
        debit: Decimal,
        credit: Decimal,
        source: JournalSource,
        source_id: Uuid,
        created_by: i64,
    ) -> Result<(), AppError> {
        let entry_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO journal_entries (
                entry_id, entry_date, description, account_code, debit, credit,
                source_type, source_id, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry_id)
        .bind(entry_date)
        .bind(description)
        .bind(account_code)
        .bind(debit)
        .bind(credit)
        .bind(source.as_str())
        .bind(source_id)
        .bind(created_by)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert journal entry: {}", e))
        })?;

        Ok(())
    }
}
