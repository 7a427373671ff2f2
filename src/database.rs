use std::{borrow::Cow, collections::HashMap, time::Duration};

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection, Executor, PgConnection, PgPool, Postgres, Transaction,
};
use uuid::Uuid;

use crate::analytics::{BusinessTotals, DailyAmount, DateWindow, HourlyCount, PlatformTotals};
use crate::checkin::ensure_sufficient_credit;
use crate::errors::{ApiError, ApiResult};
use crate::lifecycle::{booking_transition_error, reconciliation_variance, MemberEvent, MemberStanding};
use crate::models::{
    AdStatus, Advertisement, Booking, BookingCounts, BookingStatus, Business, Center, ChallengeRequest,
    CheckIn, CheckInStatus, CheckOut, CreateAdvertisementRequest, CreateBookingRequest,
    CreateInvoiceRequest, CreateReconciliationRequest, CreateTransactionRequest, GroupActivity,
    GroupActivityRequest, InvoiceStatusUpdateRequest, InvoiceTotals, LineItemStatus, Member,
    MemberCounts, MemberInvoice, MemberPayment, NewMember, NewPayment, Payment, PaymentSummary,
    Reconciliation, ReconciliationLineItem, ReconciliationStatus, ReconciliationStatusRequest,
    ReconciliationSummary, RecordMemberPaymentRequest, Reward, RewardRequest, RewardState,
    Transaction as LedgerTransaction, TransactionStatus, TransactionTypeTotal, User,
    UserChallenge, UserReward, UserRewardDetail, VisitHistoryEntry, Workout, WorkoutRequest,
};
use crate::rewards::{self, ActivitySnapshot, RewardRule};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(600)))
        .test_before_acquire(true)
}

/// Ownership of a member looked up across tenants.
enum MemberOwner {
    Missing,
    Other,
    This,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = match pool_options(max_connections).connect(database_url).await {
            Ok(pool) => pool,
            Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("3D000")) => {
                log::info!("Database missing, attempting to create it");
                create_database_if_missing(database_url).await?;
                pool_options(max_connections).connect(database_url).await?
            }
            Err(err) => return Err(err),
        };

        // Run embedded migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Inserts catalog rows for rules that have none yet. Existing rows keep
    /// whatever display fields an admin gave them.
    pub async fn seed_reward_catalog(&self) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for rule in RewardRule::ALL {
            let seed = rule.seed();
            let result = sqlx::query(
                r#"
                INSERT INTO rewards (
                    id, rule, name, description, points_required,
                    category, reward_type, reward_value, reward_description
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (rule) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(rule.key())
            .bind(seed.name)
            .bind(seed.description)
            .bind(seed.points_required)
            .bind(seed.category)
            .bind(seed.reward_type)
            .bind(seed.reward_value)
            .bind(seed.reward_description)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, flex_credit, balance, plan, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_business_by_email(&self, email: &str) -> Result<Option<Business>, sqlx::Error> {
        sqlx::query_as::<_, Business>(
            r#"
            SELECT id, business_name, email, phone, address, is_active, created_at
            FROM businesses
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    // ========================================================================
    // MEMBERS
    // ========================================================================

    pub async fn create_member(&self, member: NewMember) -> Result<Member, sqlx::Error> {
        let NewMember {
            id,
            business_id,
            first_name,
            last_name,
            email,
            phone,
            membership_type,
            payment_status,
            membership_status,
            is_active,
        } = member;

        sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (
                id, business_id, first_name, last_name, email, phone,
                membership_type, payment_status, membership_status, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING
                id, business_id, first_name, last_name, email, phone, membership_type,
                payment_status, membership_status, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(phone)
        .bind(membership_type)
        .bind(payment_status)
        .bind(membership_status)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_members(&self, business_id: Uuid) -> Result<Vec<Member>, sqlx::Error> {
        sqlx::query_as::<_, Member>(
            r#"
            SELECT
                id, business_id, first_name, last_name, email, phone, membership_type,
                payment_status, membership_status, is_active, created_at, updated_at
            FROM members
            WHERE business_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_member(
        &self,
        business_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Member>, sqlx::Error> {
        sqlx::query_as::<_, Member>(
            r#"
            SELECT
                id, business_id, first_name, last_name, email, phone, membership_type,
                payment_status, membership_status, is_active, created_at, updated_at
            FROM members
            WHERE id = $1 AND business_id = $2
            "#,
        )
        .bind(member_id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn update_member(&self, member: Member) -> Result<Member, sqlx::Error> {
        sqlx::query_as::<_, Member>(
            r#"
            UPDATE members
            SET first_name = $3,
                last_name = $4,
                email = $5,
                phone = $6,
                membership_type = $7,
                updated_at = NOW()
            WHERE id = $1 AND business_id = $2
            RETURNING
                id, business_id, first_name, last_name, email, phone, membership_type,
                payment_status, membership_status, is_active, created_at, updated_at
            "#,
        )
        .bind(member.id)
        .bind(member.business_id)
        .bind(member.first_name)
        .bind(member.last_name)
        .bind(member.email)
        .bind(member.phone)
        .bind(member.membership_type)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_member(&self, business_id: Uuid, member_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1 AND business_id = $2")
            .bind(member_id)
            .bind(business_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn lock_member(
        conn: &mut PgConnection,
        business_id: Uuid,
        member_id: Uuid,
    ) -> ApiResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            SELECT
                id, business_id, first_name, last_name, email, phone, membership_type,
                payment_status, membership_status, is_active, created_at, updated_at
            FROM members
            WHERE id = $1 AND business_id = $2
            FOR UPDATE
            "#,
        )
        .bind(member_id)
        .bind(business_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))
    }

    /// Writes the standing produced by `event`; `is_active` is derived here
    /// and nowhere else.
    async fn write_standing(
        conn: &mut PgConnection,
        member: &Member,
        event: MemberEvent,
    ) -> Result<Member, sqlx::Error> {
        let standing = MemberStanding::of(member).apply(event);
        sqlx::query_as::<_, Member>(
            r#"
            UPDATE members
            SET payment_status = $2,
                membership_status = $3,
                is_active = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING
                id, business_id, first_name, last_name, email, phone, membership_type,
                payment_status, membership_status, is_active, created_at, updated_at
            "#,
        )
        .bind(member.id)
        .bind(standing.payment_status)
        .bind(standing.membership_status)
        .bind(standing.is_active())
        .fetch_one(conn)
        .await
    }

    pub async fn apply_member_event(
        &self,
        business_id: Uuid,
        member_id: Uuid,
        event: MemberEvent,
    ) -> ApiResult<Member> {
        let mut tx = self.pool.begin().await?;
        let member = Self::lock_member(tx.as_mut(), business_id, member_id).await?;
        let updated = Self::write_standing(tx.as_mut(), &member, event).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn record_member_payment(
        &self,
        business_id: Uuid,
        member_id: Uuid,
        request: RecordMemberPaymentRequest,
    ) -> ApiResult<(MemberPayment, Member)> {
        let mut tx = self.pool.begin().await?;
        let member = Self::lock_member(tx.as_mut(), business_id, member_id).await?;

        let payment = sqlx::query_as::<_, MemberPayment>(
            r#"
            INSERT INTO member_payments (id, member_id, amount, payment_method, receipt_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, member_id, amount, payment_method, receipt_url, paid_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member.id)
        .bind(request.amount)
        .bind(request.payment_method.unwrap_or_else(|| "card".to_string()))
        .bind(request.receipt_url)
        .fetch_one(tx.as_mut())
        .await?;

        let member = Self::write_standing(tx.as_mut(), &member, MemberEvent::PaymentRecorded).await?;
        tx.commit().await?;

        Ok((payment, member))
    }

    /// 404 unless the member exists and belongs to the business.
    async fn ensure_member_scoped(
        conn: &mut PgConnection,
        business_id: Uuid,
        member_id: Uuid,
    ) -> ApiResult<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM members WHERE id = $1 AND business_id = $2)",
        )
        .bind(member_id)
        .bind(business_id)
        .fetch_one(conn)
        .await?;
        if !exists {
            return Err(ApiError::not_found("Member not found"));
        }
        Ok(())
    }

    pub async fn list_member_payments(
        &self,
        business_id: Uuid,
        member_id: Uuid,
    ) -> ApiResult<Vec<MemberPayment>> {
        let mut conn = self.pool.acquire().await?;
        Self::ensure_member_scoped(&mut conn, business_id, member_id).await?;
        let payments = sqlx::query_as::<_, MemberPayment>(
            r#"
            SELECT id, member_id, amount, payment_method, receipt_url, paid_at
            FROM member_payments
            WHERE member_id = $1
            ORDER BY paid_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(payments)
    }

    pub async fn create_invoice(
        &self,
        business_id: Uuid,
        member_id: Uuid,
        request: CreateInvoiceRequest,
    ) -> ApiResult<MemberInvoice> {
        let mut tx = self.pool.begin().await?;
        let member = Self::lock_member(tx.as_mut(), business_id, member_id).await?;

        let invoice = sqlx::query_as::<_, MemberInvoice>(
            r#"
            INSERT INTO member_invoices (id, member_id, amount, description, due_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, member_id, amount, description, issued_at, due_date, is_paid, paid_at, receipt_url
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member.id)
        .bind(request.amount)
        .bind(request.description)
        .bind(request.due_date)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(invoice)
    }

    pub async fn list_invoices(
        &self,
        business_id: Uuid,
        member_id: Uuid,
    ) -> ApiResult<Vec<MemberInvoice>> {
        let mut conn = self.pool.acquire().await?;
        Self::ensure_member_scoped(&mut conn, business_id, member_id).await?;
        let invoices = sqlx::query_as::<_, MemberInvoice>(
            r#"
            SELECT id, member_id, amount, description, issued_at, due_date,
                   is_paid, paid_at, receipt_url
            FROM member_invoices
            WHERE member_id = $1
            ORDER BY issued_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(invoices)
    }

    /// Marks an invoice paid or unpaid. Paying cascades to the member the same
    /// way a recorded payment does.
    pub async fn set_invoice_status(
        &self,
        business_id: Uuid,
        invoice_id: Uuid,
        request: InvoiceStatusUpdateRequest,
    ) -> ApiResult<(MemberInvoice, Member)> {
        let mut tx = self.pool.begin().await?;

        let member_id: Uuid = sqlx::query_scalar(
            r#"
            SELECT i.member_id
            FROM member_invoices i
            JOIN members m ON m.id = i.member_id
            WHERE i.id = $1 AND m.business_id = $2
            "#,
        )
        .bind(invoice_id)
        .bind(business_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;

        let member = Self::lock_member(tx.as_mut(), business_id, member_id).await?;

        let paid_at = request
            .is_paid
            .then(|| request.paid_at.unwrap_or_else(Utc::now));

        let invoice = sqlx::query_as::<_, MemberInvoice>(
            r#"
            UPDATE member_invoices
            SET is_paid = $2,
                paid_at = $3,
                receipt_url = COALESCE($4, receipt_url)
            WHERE id = $1
            RETURNING id, member_id, amount, description, issued_at, due_date, is_paid, paid_at, receipt_url
            "#,
        )
        .bind(invoice_id)
        .bind(request.is_paid)
        .bind(paid_at)
        .bind(request.receipt_url)
        .fetch_one(tx.as_mut())
        .await?;

        let member = if request.is_paid {
            Self::write_standing(tx.as_mut(), &member, MemberEvent::PaymentRecorded).await?
        } else {
            member
        };

        tx.commit().await?;
        Ok((invoice, member))
    }

    pub async fn member_counts(&self, business_id: Uuid) -> Result<MemberCounts, sqlx::Error> {
        sqlx::query_as::<_, MemberCounts>(
            r#"
            SELECT
                COUNT(*) AS total_members,
                COUNT(*) FILTER (WHERE is_active) AS active_members,
                COUNT(*) FILTER (WHERE NOT is_active) AS inactive_members,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS new_members_last_30_days,
                COUNT(*) FILTER (WHERE payment_status = 'paid') AS paid,
                COUNT(*) FILTER (WHERE payment_status = 'unpaid') AS unpaid,
                COUNT(*) FILTER (WHERE payment_status = 'overdue') AS overdue,
                COUNT(*) FILTER (WHERE membership_status = 'active') AS status_active,
                COUNT(*) FILTER (WHERE membership_status = 'inactive') AS status_inactive,
                COUNT(*) FILTER (WHERE membership_status = 'suspended') AS status_suspended,
                COUNT(*) FILTER (WHERE membership_status = 'expired') AS status_expired
            FROM members
            WHERE business_id = $1
            "#,
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn invoice_totals(&self, business_id: Uuid) -> Result<InvoiceTotals, sqlx::Error> {
        sqlx::query_as::<_, InvoiceTotals>(
            r#"
            SELECT
                COUNT(i.id) AS total_invoices,
                COUNT(i.id) FILTER (WHERE i.is_paid) AS paid_invoices,
                COALESCE(SUM(i.amount) FILTER (WHERE i.is_paid), 0) AS total_revenue
            FROM member_invoices i
            JOIN members m ON m.id = i.member_id
            WHERE m.business_id = $1
            "#,
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn member_owner(
        conn: &mut PgConnection,
        business_id: Uuid,
        member_id: Uuid,
    ) -> Result<MemberOwner, sqlx::Error> {
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT business_id FROM members WHERE id = $1")
                .bind(member_id)
                .fetch_optional(conn)
                .await?;
        Ok(match owner {
            None => MemberOwner::Missing,
            Some(owner) if owner == business_id => MemberOwner::This,
            Some(_) => MemberOwner::Other,
        })
    }

    async fn ensure_own_member(
        conn: &mut PgConnection,
        business_id: Uuid,
        member_id: Uuid,
    ) -> ApiResult<()> {
        match Self::member_owner(conn, business_id, member_id).await? {
            MemberOwner::This => Ok(()),
            MemberOwner::Missing => Err(ApiError::not_found("Member not found")),
            MemberOwner::Other => Err(ApiError::Forbidden(
                "Member does not belong to this business".into(),
            )),
        }
    }

    // ========================================================================
    // CHECK-IN / CHECK-OUT
    // ========================================================================

    pub async fn get_center(&self, center_id: Uuid) -> Result<Option<Center>, sqlx::Error> {
        sqlx::query_as::<_, Center>(
            "SELECT id, business_id, name, address, state, credit_required FROM centers WHERE id = $1",
        )
        .bind(center_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn member_check_in(
        &self,
        business_id: Uuid,
        member_id: Uuid,
        center_id: Uuid,
    ) -> ApiResult<CheckIn> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_own_member(tx.as_mut(), business_id, member_id).await?;

        let center_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM centers WHERE id = $1)")
                .bind(center_id)
                .fetch_one(tx.as_mut())
                .await?;
        if !center_exists {
            return Err(ApiError::not_found("Center not found"));
        }

        let already_in: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM check_ins WHERE member_id = $1 AND status = 'active')",
        )
        .bind(member_id)
        .fetch_one(tx.as_mut())
        .await?;
        if already_in {
            return Err(ApiError::conflict("Member is already checked in"));
        }

        let check_in = sqlx::query_as::<_, CheckIn>(
            r#"
            INSERT INTO check_ins (id, member_id, center_id, business_id, status, credits_spent)
            VALUES ($1, $2, $3, $4, $5, 0)
            RETURNING id, user_id, member_id, center_id, business_id, check_in_time, status, credits_spent
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(center_id)
        .bind(business_id)
        .bind(CheckInStatus::Active)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(check_in)
    }

    pub async fn member_check_out(
        &self,
        business_id: Uuid,
        member_id: Uuid,
    ) -> ApiResult<CheckOut> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_own_member(tx.as_mut(), business_id, member_id).await?;

        let active = sqlx::query_as::<_, CheckIn>(
            r#"
            UPDATE check_ins
            SET status = 'completed'
            WHERE id = (
                SELECT id FROM check_ins
                WHERE member_id = $1 AND status = 'active'
                ORDER BY check_in_time DESC
                LIMIT 1
                FOR UPDATE
            )
            RETURNING id, user_id, member_id, center_id, business_id, check_in_time, status, credits_spent
            "#,
        )
        .bind(member_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or_else(|| ApiError::conflict("No active check-in found for this member"))?;

        let check_out = sqlx::query_as::<_, CheckOut>(
            r#"
            INSERT INTO check_outs (id, member_id, center_id, check_in_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, member_id, center_id, check_in_id, timestamp
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(active.center_id)
        .bind(active.id)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(check_out)
    }

    /// Deducts the center's credit cost from the scanned user and records the
    /// visit. Only the business owning the center may confirm. A code issued
    /// at `issued_at` confirms at most one visit. Returns the new check-in and
    /// the remaining balance.
    pub async fn confirm_user_check_in(
        &self,
        business_id: Uuid,
        user_id: Uuid,
        center_id: Uuid,
        issued_at: Option<DateTime<Utc>>,
    ) -> ApiResult<(CheckIn, i32)> {
        let mut tx = self.pool.begin().await?;

        let center = sqlx::query_as::<_, Center>(
            "SELECT id, business_id, name, address, state, credit_required FROM centers WHERE id = $1",
        )
        .bind(center_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or_else(|| ApiError::not_found("Center not found"))?;
        if center.business_id != Some(business_id) {
            return Err(ApiError::Forbidden(
                "Center does not belong to this business".into(),
            ));
        }

        let flex_credit: i32 =
            sqlx::query_scalar("SELECT flex_credit FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(tx.as_mut())
                .await?
                .ok_or_else(|| ApiError::not_found("User not found"))?;

        if let Some(issued_at) = issued_at {
            let used: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM check_ins
                    WHERE user_id = $1 AND center_id = $2 AND check_in_time >= $3
                )
                "#,
            )
            .bind(user_id)
            .bind(center.id)
            .bind(issued_at)
            .fetch_one(tx.as_mut())
            .await?;
            if used {
                return Err(ApiError::conflict("QR code has already been used"));
            }
        }

        ensure_sufficient_credit(flex_credit, center.credit_required)?;

        let remaining: i32 = sqlx::query_scalar(
            r#"
            UPDATE users
            SET flex_credit = flex_credit - $2
            WHERE id = $1 AND flex_credit >= $2
            RETURNING flex_credit
            "#,
        )
        .bind(user_id)
        .bind(center.credit_required)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or(ApiError::InsufficientCredit)?;

        // Never earlier than the code it consumes.
        let check_in_time = issued_at.map_or_else(Utc::now, |at| at.max(Utc::now()));
        let check_in = sqlx::query_as::<_, CheckIn>(
            r#"
            INSERT INTO check_ins (id, user_id, center_id, business_id, check_in_time, status, credits_spent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, member_id, center_id, business_id, check_in_time, status, credits_spent
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(center.id)
        .bind(center.business_id)
        .bind(check_in_time)
        .bind(CheckInStatus::Active)
        .bind(center.credit_required)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok((check_in, remaining))
    }

    /// Logs a user check-out, closing the latest open visit at that center
    /// when there is one.
    pub async fn user_check_out(&self, user_id: Uuid, center_id: Uuid) -> ApiResult<CheckOut> {
        let mut tx = self.pool.begin().await?;

        let center_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM centers WHERE id = $1)")
                .bind(center_id)
                .fetch_one(tx.as_mut())
                .await?;
        if !center_exists {
            return Err(ApiError::not_found("Center not found"));
        }

        let closed: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE check_ins
            SET status = 'completed'
            WHERE id = (
                SELECT id FROM check_ins
                WHERE user_id = $1 AND center_id = $2 AND status = 'active'
                ORDER BY check_in_time DESC
                LIMIT 1
                FOR UPDATE
            )
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(center_id)
        .fetch_optional(tx.as_mut())
        .await?;

        if closed.is_none() {
            log::info!("User {user_id} checked out of {center_id} without an open check-in");
        }

        let check_out = sqlx::query_as::<_, CheckOut>(
            r#"
            INSERT INTO check_outs (id, user_id, center_id, check_in_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, member_id, center_id, check_in_id, timestamp
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(center_id)
        .bind(closed)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(check_out)
    }

    pub async fn check_in_history(
        &self,
        user_id: Uuid,
        window: Option<DateWindow>,
    ) -> Result<Vec<VisitHistoryEntry>, sqlx::Error> {
        let (from, until) = window_bounds(window);
        sqlx::query_as::<_, VisitHistoryEntry>(
            r#"
            SELECT ci.id, ci.center_id, c.name AS center_name, c.address AS center_address,
                   ci.check_in_time AS timestamp
            FROM check_ins ci
            JOIN centers c ON c.id = ci.center_id
            WHERE ci.user_id = $1
              AND ($2::timestamptz IS NULL OR ci.check_in_time >= $2)
              AND ($3::timestamptz IS NULL OR ci.check_in_time < $3)
            ORDER BY ci.check_in_time DESC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn check_out_history(
        &self,
        user_id: Uuid,
        window: Option<DateWindow>,
    ) -> Result<Vec<VisitHistoryEntry>, sqlx::Error> {
        let (from, until) = window_bounds(window);
        sqlx::query_as::<_, VisitHistoryEntry>(
            r#"
            SELECT co.id, co.center_id, c.name AS center_name, c.address AS center_address,
                   co.timestamp
            FROM check_outs co
            JOIN centers c ON c.id = co.center_id
            WHERE co.user_id = $1
              AND ($2::timestamptz IS NULL OR co.timestamp >= $2)
              AND ($3::timestamptz IS NULL OR co.timestamp < $3)
            ORDER BY co.timestamp DESC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
    }

    // ========================================================================
    // USER PAYMENTS
    // ========================================================================

    async fn insert_payment_with_tx(
        tx: &mut Transaction<'_, Postgres>,
        payment: NewPayment,
    ) -> Result<Payment, sqlx::Error> {
        let NewPayment {
            id,
            user_id,
            business_id,
            amount,
            payment_type,
            status,
            payment_method,
            description,
        } = payment;

        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, user_id, business_id, amount, payment_type, status, payment_method, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                id, user_id, business_id, amount, currency, payment_type, status,
                payment_method, description, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(business_id)
        .bind(amount)
        .bind(payment_type)
        .bind(status)
        .bind(payment_method)
        .bind(description)
        .fetch_one(tx.as_mut())
        .await
    }

    pub async fn record_top_up(
        &self,
        payment: NewPayment,
        credits: i32,
    ) -> Result<(Payment, User), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let user_id = payment.user_id;
        let amount = payment.amount;
        let payment = Self::insert_payment_with_tx(&mut tx, payment).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET flex_credit = flex_credit + $2,
                balance = balance + $3
            WHERE id = $1
            RETURNING id, username, email, full_name, flex_credit, balance, plan, created_at
            "#,
        )
        .bind(user_id)
        .bind(credits)
        .bind(amount)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok((payment, user))
    }

    pub async fn record_subscription(
        &self,
        payment: NewPayment,
        plan: &str,
    ) -> Result<(Payment, User), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let user_id = payment.user_id;
        let payment = Self::insert_payment_with_tx(&mut tx, payment).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET plan = $2
            WHERE id = $1
            RETURNING id, username, email, full_name, flex_credit, balance, plan, created_at
            "#,
        )
        .bind(user_id)
        .bind(plan)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok((payment, user))
    }

    pub async fn list_user_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT
                id, user_id, business_id, amount, currency, payment_type, status,
                payment_method, description, created_at
            FROM payments
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Payments attributed to a business: user payments carrying its id plus
    /// payments recorded against its members, which are always completed.
    pub async fn payment_summary(
        &self,
        business_id: Uuid,
        window: DateWindow,
    ) -> Result<PaymentSummary, sqlx::Error> {
        sqlx::query_as::<_, PaymentSummary>(
            r#"
            WITH attributed AS (
                SELECT amount, status::TEXT AS status, created_at
                FROM payments
                WHERE business_id = $1
                UNION ALL
                SELECT p.amount, 'completed', p.paid_at
                FROM member_payments p
                JOIN members m ON m.id = p.member_id
                WHERE m.business_id = $1
            )
            SELECT
                COUNT(*) FILTER (WHERE status = 'completed' AND created_at >= $2 AND created_at < $3)
                    AS completed_payments,
                COALESCE(SUM(amount) FILTER (WHERE status = 'completed' AND created_at >= $2 AND created_at < $3), 0)
                    AS total_revenue,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_payments,
                COUNT(*) FILTER (WHERE status = 'failed' AND created_at >= $2 AND created_at < $3)
                    AS failed_payments
            FROM attributed
            "#,
        )
        .bind(business_id)
        .bind(window.starts_at())
        .bind(window.ends_before())
        .fetch_one(&self.pool)
        .await
    }

    // ========================================================================
    // WORKOUTS / GROUP ACTIVITIES / CHALLENGES
    // ========================================================================

    pub async fn create_workout(
        &self,
        user_id: Uuid,
        request: WorkoutRequest,
    ) -> Result<Workout, sqlx::Error> {
        sqlx::query_as::<_, Workout>(
            r#"
            INSERT INTO workouts (id, user_id, workout_type, start_time, duration_minutes, with_friends)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, workout_type, start_time, duration_minutes, with_friends, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(request.workout_type)
        .bind(request.start_time.unwrap_or_else(Utc::now))
        .bind(request.duration_minutes)
        .bind(request.with_friends)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_workouts(&self, user_id: Uuid) -> Result<Vec<Workout>, sqlx::Error> {
        sqlx::query_as::<_, Workout>(
            r#"
            SELECT id, user_id, workout_type, start_time, duration_minutes, with_friends, created_at
            FROM workouts
            WHERE user_id = $1
            ORDER BY start_time DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn update_workout(
        &self,
        user_id: Uuid,
        workout_id: Uuid,
        request: WorkoutRequest,
    ) -> Result<Workout, sqlx::Error> {
        sqlx::query_as::<_, Workout>(
            r#"
            UPDATE workouts
            SET workout_type = $3,
                start_time = COALESCE($4, start_time),
                duration_minutes = $5,
                with_friends = $6
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, workout_type, start_time, duration_minutes, with_friends, created_at
            "#,
        )
        .bind(workout_id)
        .bind(user_id)
        .bind(request.workout_type)
        .bind(request.start_time)
        .bind(request.duration_minutes)
        .bind(request.with_friends)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_workout(&self, user_id: Uuid, workout_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM workouts WHERE id = $1 AND user_id = $2")
            .bind(workout_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    /// The host is recorded as the first participant.
    pub async fn create_group_activity(
        &self,
        host_id: Uuid,
        request: GroupActivityRequest,
    ) -> Result<GroupActivity, sqlx::Error> {
        sqlx::query_as::<_, GroupActivity>(
            r#"
            INSERT INTO group_activities (id, host_id, user_id, name, date)
            VALUES ($1, $2, $2, $3, $4)
            RETURNING id, host_id, user_id, name, date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(host_id)
        .bind(request.name)
        .bind(request.date.unwrap_or_else(Utc::now))
        .fetch_one(&self.pool)
        .await
    }

    /// Adds a participation row copied from the hosted activity.
    pub async fn join_group_activity(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
    ) -> ApiResult<GroupActivity> {
        let mut tx = self.pool.begin().await?;

        let source = sqlx::query_as::<_, GroupActivity>(
            "SELECT id, host_id, user_id, name, date, created_at FROM group_activities WHERE id = $1",
        )
        .bind(activity_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or_else(|| ApiError::not_found("Group activity not found"))?;

        let already_joined: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM group_activities
                WHERE user_id = $1 AND host_id = $2 AND name = $3 AND date = $4
            )
            "#,
        )
        .bind(user_id)
        .bind(source.host_id)
        .bind(&source.name)
        .bind(source.date)
        .fetch_one(tx.as_mut())
        .await?;
        if already_joined {
            return Err(ApiError::conflict("Already joined this group activity"));
        }

        let joined = sqlx::query_as::<_, GroupActivity>(
            r#"
            INSERT INTO group_activities (id, host_id, user_id, name, date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, host_id, user_id, name, date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(source.host_id)
        .bind(user_id)
        .bind(source.name)
        .bind(source.date)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(joined)
    }

    pub async fn list_group_activities(&self, user_id: Uuid) -> Result<Vec<GroupActivity>, sqlx::Error> {
        sqlx::query_as::<_, GroupActivity>(
            r#"
            SELECT id, host_id, user_id, name, date, created_at
            FROM group_activities
            WHERE user_id = $1 OR host_id = $1
            ORDER BY date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn delete_group_activity(&self, host_id: Uuid, activity_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM group_activities WHERE id = $1 AND host_id = $2")
            .bind(activity_id)
            .bind(host_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    pub async fn create_challenge(
        &self,
        user_id: Uuid,
        request: ChallengeRequest,
    ) -> Result<UserChallenge, sqlx::Error> {
        sqlx::query_as::<_, UserChallenge>(
            r#"
            INSERT INTO user_challenges (id, user_id, name, completed, completed_at)
            VALUES ($1, $2, $3, $4, CASE WHEN $4 THEN NOW() END)
            RETURNING id, user_id, name, completed, completed_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(request.name)
        .bind(request.completed)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_challenges(&self, user_id: Uuid) -> Result<Vec<UserChallenge>, sqlx::Error> {
        sqlx::query_as::<_, UserChallenge>(
            r#"
            SELECT id, user_id, name, completed, completed_at, created_at
            FROM user_challenges
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn update_challenge(
        &self,
        user_id: Uuid,
        challenge_id: Uuid,
        request: ChallengeRequest,
    ) -> Result<UserChallenge, sqlx::Error> {
        sqlx::query_as::<_, UserChallenge>(
            r#"
            UPDATE user_challenges
            SET name = $3,
                completed = $4,
                completed_at = CASE
                    WHEN $4 THEN COALESCE(completed_at, NOW())
                    ELSE NULL
                END
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, completed, completed_at, created_at
            "#,
        )
        .bind(challenge_id)
        .bind(user_id)
        .bind(request.name)
        .bind(request.completed)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_challenge(&self, user_id: Uuid, challenge_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_challenges WHERE id = $1 AND user_id = $2")
            .bind(challenge_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    // ========================================================================
    // REWARDS
    // ========================================================================

    pub async fn list_rewards(&self) -> Result<Vec<Reward>, sqlx::Error> {
        sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, rule, name, description, points_required, category, reward_type,
                   reward_value, reward_description, created_at
            FROM rewards
            ORDER BY points_required, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_reward(&self, request: RewardRequest) -> Result<Reward, sqlx::Error> {
        sqlx::query_as::<_, Reward>(
            r#"
            INSERT INTO rewards (
                id, rule, name, description, points_required,
                category, reward_type, reward_value, reward_description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, rule, name, description, points_required, category, reward_type,
                      reward_value, reward_description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.rule)
        .bind(request.name)
        .bind(request.description)
        .bind(request.points_required)
        .bind(request.category)
        .bind(request.reward_type)
        .bind(request.reward_value)
        .bind(request.reward_description)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_reward(
        &self,
        reward_id: Uuid,
        request: RewardRequest,
    ) -> Result<Reward, sqlx::Error> {
        sqlx::query_as::<_, Reward>(
            r#"
            UPDATE rewards
            SET rule = $2,
                name = $3,
                description = $4,
                points_required = $5,
                category = $6,
                reward_type = $7,
                reward_value = $8,
                reward_description = $9
            WHERE id = $1
            RETURNING id, rule, name, description, points_required, category, reward_type,
                      reward_value, reward_description, created_at
            "#,
        )
        .bind(reward_id)
        .bind(request.rule)
        .bind(request.name)
        .bind(request.description)
        .bind(request.points_required)
        .bind(request.category)
        .bind(request.reward_type)
        .bind(request.reward_value)
        .bind(request.reward_description)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_reward(&self, reward_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM rewards WHERE id = $1")
            .bind(reward_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn activity_snapshot_with_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        month_start: DateTime<Utc>,
    ) -> Result<ActivitySnapshot, sqlx::Error> {
        sqlx::query_as::<_, ActivitySnapshot>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM payments WHERE user_id = $1) AS payment_count,
                (SELECT COUNT(DISTINCT center_id) FROM check_ins WHERE user_id = $1) AS distinct_centers,
                (SELECT COUNT(DISTINCT date_trunc('month', created_at AT TIME ZONE 'UTC'))
                    FROM payments
                    WHERE user_id = $1 AND payment_type = 'subscription' AND status = 'completed')
                    AS subscription_months,
                (SELECT COALESCE(SUM(credits_spent), 0)::BIGINT FROM check_ins WHERE user_id = $1)
                    AS credits_used,
                (SELECT COUNT(*) FROM group_activities WHERE user_id = $1) AS activities_joined,
                (SELECT COUNT(*) FROM group_activities WHERE host_id = $1) AS activities_hosted,
                (SELECT COUNT(*) FROM workouts WHERE user_id = $1 AND with_friends)
                    AS workouts_with_friends,
                (SELECT COUNT(*) FROM workouts
                    WHERE user_id = $1 AND EXTRACT(HOUR FROM start_time AT TIME ZONE 'UTC') < 8)
                    AS early_workouts,
                (SELECT COUNT(*) FROM workouts WHERE user_id = $1 AND start_time >= $2)
                    AS workouts_this_month,
                (SELECT COALESCE(SUM(duration_minutes), 0)::BIGINT FROM workouts WHERE user_id = $1)
                    AS total_workout_minutes,
                (SELECT COUNT(DISTINCT lower(workout_type)) FROM workouts WHERE user_id = $1)
                    AS distinct_workout_types,
                (SELECT COUNT(*) FROM user_challenges WHERE user_id = $1 AND completed)
                    AS completed_challenges
            "#,
        )
        .bind(user_id)
        .bind(month_start)
        .fetch_one(tx.as_mut())
        .await
    }

    /// Recomputes every catalog reward for the user from their history and
    /// returns the rewards that became unlocked on this run.
    pub async fn check_and_unlock_rewards(&self, user_id: Uuid) -> Result<Vec<Reward>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let catalog = sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, rule, name, description, points_required, category, reward_type,
                   reward_value, reward_description, created_at
            FROM rewards
            "#,
        )
        .fetch_all(tx.as_mut())
        .await?;

        let previous: HashMap<Uuid, RewardState> = sqlx::query_as::<_, (Uuid, RewardState)>(
            "SELECT reward_id, state FROM user_rewards WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_all(tx.as_mut())
        .await?
        .into_iter()
        .collect();

        let snapshot = Self::activity_snapshot_with_tx(&mut tx, user_id, current_month_start()).await?;

        let mut unlocked = Vec::new();
        for reward in catalog {
            let Some(rule) = RewardRule::from_key(&reward.rule) else {
                log::warn!("Reward {} has unknown rule '{}', skipping", reward.id, reward.rule);
                continue;
            };

            let evaluation = rewards::evaluate(rule, &snapshot, previous.get(&reward.id).copied());
            let unlocked_at = (evaluation.state == RewardState::Unlocked).then(Utc::now);

            sqlx::query(
                r#"
                INSERT INTO user_rewards (id, user_id, reward_id, progress, total, state, unlocked_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (user_id, reward_id) DO UPDATE
                SET progress = EXCLUDED.progress,
                    total = EXCLUDED.total,
                    state = EXCLUDED.state,
                    unlocked_at = COALESCE(user_rewards.unlocked_at, EXCLUDED.unlocked_at),
                    updated_at = NOW()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(reward.id)
            .bind(evaluation.progress)
            .bind(evaluation.total)
            .bind(evaluation.state)
            .bind(unlocked_at)
            .execute(tx.as_mut())
            .await?;

            if evaluation.newly_unlocked {
                unlocked.push(reward);
            }
        }

        tx.commit().await?;
        Ok(unlocked)
    }

    pub async fn list_user_rewards(&self, user_id: Uuid) -> Result<Vec<UserRewardDetail>, sqlx::Error> {
        sqlx::query_as::<_, UserRewardDetail>(
            r#"
            SELECT ur.id, ur.reward_id, r.name, r.description, r.category, r.reward_description,
                   ur.progress, ur.total, ur.state, ur.unlocked_at, ur.claimed_at
            FROM user_rewards ur
            JOIN rewards r ON r.id = ur.reward_id
            WHERE ur.user_id = $1
            ORDER BY r.points_required, r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn claim_reward(&self, user_id: Uuid, reward_id: Uuid) -> ApiResult<UserReward> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, UserReward>(
            r#"
            SELECT id, user_id, reward_id, progress, total, state, unlocked_at, claimed_at, updated_at
            FROM user_rewards
            WHERE user_id = $1 AND reward_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(reward_id)
        .fetch_optional(tx.as_mut())
        .await?;

        rewards::ensure_claimable(current.as_ref())?;

        let claimed = sqlx::query_as::<_, UserReward>(
            r#"
            UPDATE user_rewards
            SET state = $3, claimed_at = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND reward_id = $2
            RETURNING id, user_id, reward_id, progress, total, state, unlocked_at, claimed_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(reward_id)
        .bind(RewardState::Claimed)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(claimed)
    }

    // ========================================================================
    // BOOKINGS
    // ========================================================================

    pub async fn create_booking(
        &self,
        business_id: Uuid,
        request: CreateBookingRequest,
    ) -> ApiResult<Booking> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_own_member(tx.as_mut(), business_id, request.member_id).await?;

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (id, business_id, member_id, center_id, date, time_slot, activity, notes, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, business_id, member_id, center_id, date, time_slot, activity, notes,
                      status, rejection_reason, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(request.member_id)
        .bind(request.center_id)
        .bind(request.date)
        .bind(request.time_slot)
        .bind(request.activity)
        .bind(request.notes)
        .bind(BookingStatus::Pending)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    pub async fn list_bookings(
        &self,
        business_id: Uuid,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, business_id, member_id, center_id, date, time_slot, activity, notes,
                   status, rejection_reason, created_at, updated_at
            FROM bookings
            WHERE business_id = $1 AND ($2::booking_status IS NULL OR status = $2)
            ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(business_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn transition_booking(
        &self,
        business_id: Uuid,
        booking_id: Uuid,
        next: BookingStatus,
        rejection_reason: Option<String>,
    ) -> ApiResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let current: BookingStatus = sqlx::query_scalar(
            "SELECT status FROM bookings WHERE id = $1 AND business_id = $2 FOR UPDATE",
        )
        .bind(booking_id)
        .bind(business_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;

        if !current.can_transition_to(next) {
            return Err(ApiError::conflict(booking_transition_error(current, next)));
        }

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $2,
                rejection_reason = COALESCE($3, rejection_reason),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, business_id, member_id, center_id, date, time_slot, activity, notes,
                      status, rejection_reason, created_at, updated_at
            "#,
        )
        .bind(booking_id)
        .bind(next)
        .bind(rejection_reason)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    pub async fn booking_counts(
        &self,
        business_id: Uuid,
        window: DateWindow,
    ) -> Result<BookingCounts, sqlx::Error> {
        sqlx::query_as::<_, BookingCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status IN ('approved', 'completed')) AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending
            FROM bookings
            WHERE business_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(business_id)
        .bind(window.starts_at())
        .bind(window.ends_before())
        .fetch_one(&self.pool)
        .await
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    pub async fn create_transaction(
        &self,
        business_id: Uuid,
        request: CreateTransactionRequest,
    ) -> Result<LedgerTransaction, sqlx::Error> {
        sqlx::query_as::<_, LedgerTransaction>(
            r#"
            INSERT INTO transactions (
                id, business_id, payment_id, transaction_type, amount, currency,
                status, reference, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, business_id, payment_id, transaction_type, amount, currency,
                      status, reference, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(request.payment_id)
        .bind(request.transaction_type)
        .bind(request.amount)
        .bind(request.currency.unwrap_or_else(|| "USD".to_string()))
        .bind(request.status.unwrap_or(TransactionStatus::Pending))
        .bind(request.reference)
        .bind(request.description)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_transactions(
        &self,
        business_id: Uuid,
        window: Option<DateWindow>,
    ) -> Result<Vec<LedgerTransaction>, sqlx::Error> {
        let (from, until) = window_bounds(window);
        sqlx::query_as::<_, LedgerTransaction>(
            r#"
            SELECT id, business_id, payment_id, transaction_type, amount, currency,
                   status, reference, description, created_at
            FROM transactions
            WHERE business_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(business_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn transaction_totals(
        &self,
        business_id: Uuid,
        window: DateWindow,
    ) -> Result<Vec<TransactionTypeTotal>, sqlx::Error> {
        sqlx::query_as::<_, TransactionTypeTotal>(
            r#"
            SELECT transaction_type, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total_amount
            FROM transactions
            WHERE business_id = $1 AND created_at >= $2 AND created_at < $3
            GROUP BY transaction_type
            ORDER BY transaction_type
            "#,
        )
        .bind(business_id)
        .bind(window.starts_at())
        .bind(window.ends_before())
        .fetch_all(&self.pool)
        .await
    }

    // ========================================================================
    // RECONCILIATIONS
    // ========================================================================

    /// Without an explicit expected total, the period's completed payments
    /// become matched line items and their sum the expected total.
    pub async fn create_reconciliation(
        &self,
        business_id: Uuid,
        request: CreateReconciliationRequest,
    ) -> ApiResult<Reconciliation> {
        let window = DateWindow::new(request.period_start, request.period_end)?;
        let mut tx = self.pool.begin().await?;

        let payments: Vec<(Uuid, f64)> = if request.expected_total.is_none() {
            sqlx::query_as::<_, (Uuid, f64)>(
                r#"
                SELECT id, amount
                FROM payments
                WHERE business_id = $1 AND status = 'completed'
                  AND created_at >= $2 AND created_at < $3
                ORDER BY created_at
                "#,
            )
            .bind(business_id)
            .bind(window.starts_at())
            .bind(window.ends_before())
            .fetch_all(tx.as_mut())
            .await?
        } else {
            Vec::new()
        };

        let expected_total = request
            .expected_total
            .unwrap_or_else(|| payments.iter().map(|(_, amount)| amount).sum());

        let reconciliation = sqlx::query_as::<_, Reconciliation>(
            r#"
            INSERT INTO reconciliations (id, business_id, period_start, period_end, expected_total, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, business_id, period_start, period_end, expected_total, actual_total,
                      variance, status, notes, reconciled_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(window.start)
        .bind(window.end)
        .bind(expected_total)
        .bind(ReconciliationStatus::Pending)
        .bind(request.notes)
        .fetch_one(tx.as_mut())
        .await?;

        for (payment_id, amount) in payments {
            sqlx::query(
                r#"
                INSERT INTO reconciliation_line_items (
                    id, reconciliation_id, payment_id, expected_amount, actual_amount, status
                )
                VALUES ($1, $2, $3, $4, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(reconciliation.id)
            .bind(payment_id)
            .bind(amount)
            .bind(LineItemStatus::Matched)
            .execute(tx.as_mut())
            .await?;
        }

        tx.commit().await?;
        Ok(reconciliation)
    }

    pub async fn list_reconciliations(&self, business_id: Uuid) -> Result<Vec<Reconciliation>, sqlx::Error> {
        sqlx::query_as::<_, Reconciliation>(
            r#"
            SELECT id, business_id, period_start, period_end, expected_total, actual_total,
                   variance, status, notes, reconciled_at, created_at
            FROM reconciliations
            WHERE business_id = $1
            ORDER BY period_start DESC
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_reconciliation(
        &self,
        business_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Option<Reconciliation>, sqlx::Error> {
        sqlx::query_as::<_, Reconciliation>(
            r#"
            SELECT id, business_id, period_start, period_end, expected_total, actual_total,
                   variance, status, notes, reconciled_at, created_at
            FROM reconciliations
            WHERE id = $1 AND business_id = $2
            "#,
        )
        .bind(reconciliation_id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_line_items(
        &self,
        business_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Vec<ReconciliationLineItem>, sqlx::Error> {
        sqlx::query_as::<_, ReconciliationLineItem>(
            r#"
            SELECT li.id, li.reconciliation_id, li.payment_id, li.expected_amount,
                   li.actual_amount, li.status, li.notes
            FROM reconciliation_line_items li
            JOIN reconciliations r ON r.id = li.reconciliation_id
            WHERE li.reconciliation_id = $1 AND r.business_id = $2
            "#,
        )
        .bind(reconciliation_id)
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn update_reconciliation_status(
        &self,
        business_id: Uuid,
        reconciliation_id: Uuid,
        request: ReconciliationStatusRequest,
    ) -> ApiResult<Reconciliation> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Reconciliation>(
            r#"
            SELECT id, business_id, period_start, period_end, expected_total, actual_total,
                   variance, status, notes, reconciled_at, created_at
            FROM reconciliations
            WHERE id = $1 AND business_id = $2
            FOR UPDATE
            "#,
        )
        .bind(reconciliation_id)
        .bind(business_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or_else(|| ApiError::not_found("Reconciliation not found"))?;

        if !current.status.can_transition_to(request.status) {
            return Err(ApiError::conflict(format!(
                "Cannot move reconciliation from {:?} to {:?}",
                current.status, request.status
            )));
        }

        let actual_total = request.actual_total.or(current.actual_total);
        let completing = request.status == ReconciliationStatus::Completed;
        let variance = match (completing, actual_total) {
            (true, Some(actual)) => Some(reconciliation_variance(current.expected_total, actual)),
            (true, None) => {
                return Err(ApiError::validation(
                    "actual_total is required to complete a reconciliation",
                ))
            }
            (false, _) => current.variance,
        };

        let updated = sqlx::query_as::<_, Reconciliation>(
            r#"
            UPDATE reconciliations
            SET status = $2,
                actual_total = $3,
                variance = $4,
                notes = COALESCE($5, notes),
                reconciled_at = CASE WHEN $6 THEN NOW() ELSE reconciled_at END
            WHERE id = $1
            RETURNING id, business_id, period_start, period_end, expected_total, actual_total,
                      variance, status, notes, reconciled_at, created_at
            "#,
        )
        .bind(reconciliation_id)
        .bind(request.status)
        .bind(actual_total)
        .bind(variance)
        .bind(request.notes)
        .bind(completing)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn reconciliation_summary(
        &self,
        business_id: Uuid,
        window: DateWindow,
    ) -> Result<ReconciliationSummary, sqlx::Error> {
        sqlx::query_as::<_, ReconciliationSummary>(
            r#"
            SELECT
                COUNT(*) AS total_reconciliations,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COALESCE(SUM(expected_total), 0) AS total_expected,
                COALESCE(SUM(actual_total), 0) AS total_actual,
                COALESCE(SUM(variance), 0) AS total_variance
            FROM reconciliations
            WHERE business_id = $1 AND period_start >= $2 AND period_end <= $3
            "#,
        )
        .bind(business_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&self.pool)
        .await
    }

    // ========================================================================
    // ADVERTISEMENTS
    // ========================================================================

    pub async fn create_advertisement(
        &self,
        request: CreateAdvertisementRequest,
        created_by: &str,
    ) -> Result<Advertisement, sqlx::Error> {
        let status = if request.start_date > Utc::now() {
            AdStatus::Scheduled
        } else {
            AdStatus::Draft
        };
        sqlx::query_as::<_, Advertisement>(
            r#"
            INSERT INTO advertisements (
                id, title, description, image_url, target_url, start_date, end_date, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, title, description, image_url, target_url, start_date, end_date,
                      status, clicks, views, created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.title)
        .bind(request.description)
        .bind(request.image_url)
        .bind(request.target_url)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(status)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_advertisements(&self, status: Option<AdStatus>) -> Result<Vec<Advertisement>, sqlx::Error> {
        sqlx::query_as::<_, Advertisement>(
            r#"
            SELECT id, title, description, image_url, target_url, start_date, end_date,
                   status, clicks, views, created_by, created_at
            FROM advertisements
            WHERE ($1::ad_status IS NULL OR status = $1)
            ORDER BY start_date DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn transition_advertisement(
        &self,
        advertisement_id: Uuid,
        next: AdStatus,
    ) -> ApiResult<Advertisement> {
        let mut tx = self.pool.begin().await?;

        let current: AdStatus =
            sqlx::query_scalar("SELECT status FROM advertisements WHERE id = $1 FOR UPDATE")
                .bind(advertisement_id)
                .fetch_optional(tx.as_mut())
                .await?
                .ok_or_else(|| ApiError::not_found("Advertisement not found"))?;

        if !current.can_transition_to(next) {
            return Err(ApiError::conflict(format!(
                "Cannot move advertisement from {current:?} to {next:?}"
            )));
        }

        let advertisement = sqlx::query_as::<_, Advertisement>(
            r#"
            UPDATE advertisements
            SET status = $2
            WHERE id = $1
            RETURNING id, title, description, image_url, target_url, start_date, end_date,
                      status, clicks, views, created_by, created_at
            "#,
        )
        .bind(advertisement_id)
        .bind(next)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(advertisement)
    }

    // ========================================================================
    // ANALYTICS
    // ========================================================================

    pub async fn business_totals(
        &self,
        business_id: Uuid,
        window: DateWindow,
    ) -> Result<BusinessTotals, sqlx::Error> {
        sqlx::query_as::<_, BusinessTotals>(
            r#"
            SELECT
                (SELECT COALESCE(SUM(p.amount), 0)
                    FROM member_payments p JOIN members m ON m.id = p.member_id
                    WHERE m.business_id = $1 AND p.paid_at >= $2 AND p.paid_at < $3) AS revenue,
                (SELECT COUNT(*)
                    FROM member_payments p JOIN members m ON m.id = p.member_id
                    WHERE m.business_id = $1 AND p.paid_at >= $2 AND p.paid_at < $3) AS transactions,
                (SELECT COUNT(*) FROM check_ins
                    WHERE business_id = $1 AND check_in_time >= $2 AND check_in_time < $3) AS check_ins,
                (SELECT COUNT(*) FROM members
                    WHERE business_id = $1 AND created_at >= $2 AND created_at < $3) AS new_members
            "#,
        )
        .bind(business_id)
        .bind(window.starts_at())
        .bind(window.ends_before())
        .fetch_one(&self.pool)
        .await
    }

    /// `(total, active)` members of a business.
    pub async fn member_headcount(&self, business_id: Uuid) -> Result<(i64, i64), sqlx::Error> {
        sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM members WHERE business_id = $1",
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn peak_hours(
        &self,
        business_id: Uuid,
        window: DateWindow,
        limit: i64,
    ) -> Result<Vec<HourlyCount>, sqlx::Error> {
        sqlx::query_as::<_, HourlyCount>(
            r#"
            SELECT EXTRACT(HOUR FROM check_in_time AT TIME ZONE 'UTC')::INT AS hour, COUNT(*) AS count
            FROM check_ins
            WHERE business_id = $1 AND check_in_time >= $2 AND check_in_time < $3
            GROUP BY 1
            ORDER BY count DESC, hour
            LIMIT $4
            "#,
        )
        .bind(business_id)
        .bind(window.starts_at())
        .bind(window.ends_before())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn platform_totals(&self, window: DateWindow) -> Result<PlatformTotals, sqlx::Error> {
        sqlx::query_as::<_, PlatformTotals>(
            r#"
            SELECT
                (SELECT COALESCE(SUM(amount), 0) FROM payments
                    WHERE status = 'completed' AND created_at >= $1 AND created_at < $2) AS revenue,
                (SELECT COUNT(*) FROM payments
                    WHERE created_at >= $1 AND created_at < $2) AS payments,
                (SELECT COUNT(*) FROM check_ins
                    WHERE check_in_time >= $1 AND check_in_time < $2) AS check_ins,
                (SELECT COUNT(*) FROM users
                    WHERE created_at >= $1 AND created_at < $2) AS new_users
            "#,
        )
        .bind(window.starts_at())
        .bind(window.ends_before())
        .fetch_one(&self.pool)
        .await
    }

    /// `(users, businesses, members)` across the platform.
    pub async fn platform_headcount(&self) -> Result<(i64, i64, i64), sqlx::Error> {
        sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM businesses),
                (SELECT COUNT(*) FROM members)
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }

    pub async fn daily_revenue(&self, window: DateWindow) -> Result<Vec<DailyAmount>, sqlx::Error> {
        sqlx::query_as::<_, DailyAmount>(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
                   COALESCE(SUM(amount), 0) AS amount,
                   COUNT(*) AS count
            FROM payments
            WHERE status = 'completed' AND created_at >= $1 AND created_at < $2
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(window.starts_at())
        .bind(window.ends_before())
        .fetch_all(&self.pool)
        .await
    }

    pub async fn daily_check_ins(&self, window: DateWindow) -> Result<Vec<DailyAmount>, sqlx::Error> {
        sqlx::query_as::<_, DailyAmount>(
            r#"
            SELECT (check_in_time AT TIME ZONE 'UTC')::DATE AS day,
                   COALESCE(SUM(credits_spent), 0)::DOUBLE PRECISION AS amount,
                   COUNT(*) AS count
            FROM check_ins
            WHERE check_in_time >= $1 AND check_in_time < $2
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(window.starts_at())
        .bind(window.ends_before())
        .fetch_all(&self.pool)
        .await
    }
}

fn window_bounds(window: Option<DateWindow>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match window {
        Some(window) => (Some(window.starts_at()), Some(window.ends_before())),
        None => (None, None),
    }
}

fn current_month_start() -> DateTime<Utc> {
    let today = Utc::now().date_naive();
    today
        .with_day(1)
        .unwrap_or(today)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = database_url.parse()?;
    let database_name = options
        .get_database()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "postgres".to_string());

    if database_name.eq_ignore_ascii_case("postgres") {
        return Ok(());
    }

    let maintenance_options = options.clone().database("postgres");
    let mut connection = PgConnection::connect_with(&maintenance_options).await?;

    let escaped_name = database_name.replace('"', "\"\"");
    let create_stmt = format!("CREATE DATABASE \"{}\"", escaped_name);

    match connection.execute(create_stmt.as_str()).await {
        Ok(_) => {
            log::info!("Created database '{}'", database_name);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("42P04")) => {
            log::info!("Database '{}' already exists", database_name);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// These run against a scratch database per test, created from
/// `DATABASE_URL`: `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateMemberRequest, MemberPaymentStatus, MembershipStatus, TopUpRequest};
    use actix_web::ResponseError;

    async fn seed_business(pool: &PgPool, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO businesses (id, business_name, email) VALUES ($1, $2, $3)")
            .bind(id)
            .bind("Iron Temple")
            .bind(email)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn seed_user(pool: &PgPool, flex_credit: i32) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, email, flex_credit) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(format!("runner-{id}"))
            .bind(format!("{id}@flexpass.test"))
            .bind(flex_credit)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn seed_center(pool: &PgPool, business_id: Uuid, credit_required: i32) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO centers (id, business_id, name, credit_required) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(business_id)
        .bind("Downtown")
        .bind(credit_required)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    fn member_request(email: &str) -> CreateMemberRequest {
        CreateMemberRequest {
            first_name: "Dana".into(),
            last_name: "Reyes".into(),
            email: email.into(),
            phone: None,
            membership_type: None,
        }
    }

    async fn flex_credit(pool: &PgPool, user_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT flex_credit FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn top_up_unlocked_at(pool: &PgPool, user_id: Uuid) -> Option<DateTime<Utc>> {
        sqlx::query_scalar(
            r#"
            SELECT ur.unlocked_at
            FROM user_rewards ur
            JOIN rewards r ON r.id = ur.reward_id
            WHERE ur.user_id = $1 AND r.rule = $2
            "#,
        )
        .bind(user_id)
        .bind(RewardRule::RegularTopUp.key())
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_invoice_payment_reactivates_member(pool: PgPool) {
        let db = Database { pool };
        let business_id = seed_business(&db.pool, "desk@iron.test").await;
        let member = db
            .create_member(member_request("dana@iron.test").into_new_member(business_id))
            .await
            .unwrap();
        let member = db
            .apply_member_event(
                business_id,
                member.id,
                MemberEvent::MembershipStatusSet(MembershipStatus::Suspended),
            )
            .await
            .unwrap();
        assert!(!member.is_active);

        let invoice = db
            .create_invoice(
                business_id,
                member.id,
                CreateInvoiceRequest {
                    amount: 49.0,
                    description: Some("March dues".into()),
                    due_date: None,
                },
            )
            .await
            .unwrap();

        let (unpaid, untouched) = db
            .set_invoice_status(
                business_id,
                invoice.id,
                InvoiceStatusUpdateRequest {
                    is_paid: false,
                    paid_at: None,
                    receipt_url: None,
                },
            )
            .await
            .unwrap();
        assert!(!unpaid.is_paid);
        assert!(unpaid.paid_at.is_none());
        assert_eq!(untouched.membership_status, MembershipStatus::Suspended);
        assert_eq!(untouched.payment_status, MemberPaymentStatus::Unpaid);
        assert!(!untouched.is_active);

        let (paid, member) = db
            .set_invoice_status(
                business_id,
                invoice.id,
                InvoiceStatusUpdateRequest {
                    is_paid: true,
                    paid_at: None,
                    receipt_url: Some("https://receipts.test/1".into()),
                },
            )
            .await
            .unwrap();
        assert!(paid.is_paid);
        assert!(paid.paid_at.is_some());
        assert_eq!(member.payment_status, MemberPaymentStatus::Paid);
        assert_eq!(member.membership_status, MembershipStatus::Active);
        assert!(member.is_active);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_reward_evaluation_is_idempotent(pool: PgPool) {
        let db = Database { pool };
        db.seed_reward_catalog().await.unwrap();
        let user_id = seed_user(&db.pool, 0).await;

        for _ in 0..5 {
            let top_up = TopUpRequest {
                amount: 10.0,
                payment_method: None,
                business_id: None,
            };
            db.record_top_up(top_up.into_new_payment(user_id), 10).await.unwrap();
        }

        let first = db.check_and_unlock_rewards(user_id).await.unwrap();
        let rules: Vec<&str> = first.iter().map(|reward| reward.rule.as_str()).collect();
        assert_eq!(rules, vec![RewardRule::RegularTopUp.key()]);

        let stamped = top_up_unlocked_at(&db.pool, user_id).await;
        assert!(stamped.is_some());

        let second = db.check_and_unlock_rewards(user_id).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(top_up_unlocked_at(&db.pool, user_id).await, stamped);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_rewards WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, RewardRule::ALL.len() as i64);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_scan_confirm_debits_scanned_user_once(pool: PgPool) {
        let db = Database { pool };
        let business_id = seed_business(&db.pool, "desk@iron.test").await;
        let rival_id = seed_business(&db.pool, "desk@rival.test").await;
        let center_id = seed_center(&db.pool, business_id, 3).await;
        let user_id = seed_user(&db.pool, 5).await;
        let issued_at = Utc::now();

        let err = db
            .confirm_user_check_in(rival_id, user_id, center_id, Some(issued_at))
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 403);

        let (check_in, remaining) = db
            .confirm_user_check_in(business_id, user_id, center_id, Some(issued_at))
            .await
            .unwrap();
        assert_eq!(remaining, 2);
        assert_eq!(check_in.user_id, Some(user_id));
        assert_eq!(check_in.credits_spent, 3);
        assert_eq!(check_in.status, CheckInStatus::Active);

        let err = db
            .confirm_user_check_in(business_id, user_id, center_id, Some(issued_at))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "QR code has already been used");

        let err = db
            .confirm_user_check_in(business_id, user_id, center_id, Some(Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 402);
        assert_eq!(flex_credit(&db.pool, user_id).await, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_payment_summary_attributes_business_payments(pool: PgPool) {
        let db = Database { pool };
        let business_id = seed_business(&db.pool, "desk@iron.test").await;
        let user_id = seed_user(&db.pool, 0).await;

        let desk_top_up = TopUpRequest {
            amount: 20.0,
            payment_method: None,
            business_id: Some(business_id),
        };
        db.record_top_up(desk_top_up.into_new_payment(user_id), 20).await.unwrap();
        let app_top_up = TopUpRequest {
            amount: 99.0,
            payment_method: None,
            business_id: None,
        };
        db.record_top_up(app_top_up.into_new_payment(user_id), 99).await.unwrap();

        let member = db
            .create_member(member_request("dana@iron.test").into_new_member(business_id))
            .await
            .unwrap();
        db.record_member_payment(
            business_id,
            member.id,
            RecordMemberPaymentRequest {
                amount: 35.0,
                payment_method: None,
                receipt_url: None,
            },
        )
        .await
        .unwrap();

        let window = DateWindow::trailing(Utc::now().date_naive(), 30).unwrap();
        let summary = db.payment_summary(business_id, window).await.unwrap();
        assert_eq!(summary.completed_payments, 2);
        assert_eq!(summary.total_revenue, 55.0);
        assert_eq!(summary.pending_payments, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_member_records_are_scoped_to_business(pool: PgPool) {
        let db = Database { pool };
        let business_id = seed_business(&db.pool, "desk@iron.test").await;
        let rival_id = seed_business(&db.pool, "desk@rival.test").await;
        let member = db
            .create_member(member_request("dana@iron.test").into_new_member(business_id))
            .await
            .unwrap();

        assert!(db.list_invoices(business_id, member.id).await.unwrap().is_empty());
        let err = db.list_invoices(rival_id, member.id).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);
        let err = db.list_member_payments(business_id, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);

        let duplicate = db
            .create_member(member_request("dana@iron.test").into_new_member(business_id))
            .await
            .unwrap_err();
        assert!(matches!(&duplicate, sqlx::Error::Database(db_err) if db_err.is_unique_violation()));
        db.create_member(member_request("dana@iron.test").into_new_member(rival_id))
            .await
            .unwrap();
    }
}
