use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// ENUMS
// ============================================================================

/// Member payment standing (Postgres enum `member_payment_status`)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "member_payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemberPaymentStatus {
    Paid,
    Unpaid,
    Overdue,
}

impl FromStr for MemberPaymentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(Self::Paid),
            "unpaid" => Ok(Self::Unpaid),
            "overdue" => Ok(Self::Overdue),
            other => Err(format!(
                "Invalid payment status '{other}'. Must be one of: paid, unpaid, overdue"
            )),
        }
    }
}

/// Member membership standing (Postgres enum `membership_status`)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Inactive,
    Suspended,
    Expired,
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            "expired" => Ok(Self::Expired),
            other => Err(format!(
                "Invalid membership status '{other}'. Must be one of: active, inactive, suspended, expired"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "check_in_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Subscription,
    FlexCredit,
    ActivityBooking,
    GymAccess,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Approved,
}

/// Persisted state of a user's progress toward a reward
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "reward_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RewardState {
    Locked,
    Unlocked,
    Claimed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    Refund,
    Fee,
    Payout,
    Adjustment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "reconciliation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "line_item_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LineItemStatus {
    Matched,
    Unmatched,
    Disputed,
    Resolved,
}

/// Advertisement lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "ad_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    Draft,
    Scheduled,
    Active,
    Ended,
}

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Consumer account holding flex credit
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub flex_credit: i32,
    pub balance: f64,
    pub plan: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Gym operator account; members, bookings and ledgers hang off it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Business {
    pub id: Uuid,
    pub business_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// MEMBERS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: Uuid,
    pub business_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub membership_type: String,
    pub payment_status: MemberPaymentStatus,
    pub membership_status: MembershipStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Helper struct used when inserting a new member
#[derive(Debug, Clone)]
pub struct NewMember {
    pub id: Uuid,
    pub business_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub membership_type: String,
    pub payment_status: MemberPaymentStatus,
    pub membership_status: MembershipStatus,
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMemberRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub membership_type: Option<String>,
}

impl CreateMemberRequest {
    pub fn into_new_member(self, business_id: Uuid) -> NewMember {
        NewMember {
            id: Uuid::new_v4(),
            business_id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            membership_type: self
                .membership_type
                .unwrap_or_else(|| "standard".to_string()),
            payment_status: MemberPaymentStatus::Unpaid,
            membership_status: MembershipStatus::Active,
            is_active: true,
        }
    }
}

/// Contact and plan edits. Statuses change only through the lifecycle endpoints.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMemberRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub membership_type: Option<String>,
}

impl UpdateMemberRequest {
    pub fn apply_to_existing(self, mut member: Member) -> Member {
        if let Some(first_name) = self.first_name {
            member.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            member.last_name = last_name;
        }
        if let Some(email) = self.email {
            member.email = email;
        }
        if let Some(phone) = self.phone {
            member.phone = Some(phone);
        }
        if let Some(membership_type) = self.membership_type {
            member.membership_type = membership_type;
        }
        member
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusUpdateRequest {
    pub payment_status: String,
}

#[derive(Debug, Deserialize)]
pub struct MembershipStatusUpdateRequest {
    pub membership_status: String,
}

/// Immutable record of money received from a member
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberPayment {
    pub id: Uuid,
    pub member_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub receipt_url: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordMemberPaymentRequest {
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberInvoice {
    pub id: Uuid,
    pub member_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceStatusUpdateRequest {
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub receipt_url: Option<String>,
}

/// Counts backing the member stats overview
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct MemberCounts {
    pub total_members: i64,
    pub active_members: i64,
    pub inactive_members: i64,
    pub new_members_last_30_days: i64,
    pub paid: i64,
    pub unpaid: i64,
    pub overdue: i64,
    pub status_active: i64,
    pub status_inactive: i64,
    pub status_suspended: i64,
    pub status_expired: i64,
}

#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct InvoiceTotals {
    pub total_invoices: i64,
    pub paid_invoices: i64,
    pub total_revenue: f64,
}

// ============================================================================
// CENTERS / CHECK-IN
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Center {
    pub id: Uuid,
    pub business_id: Option<Uuid>,
    pub name: String,
    pub address: Option<String>,
    pub state: Option<String>,
    pub credit_required: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckIn {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub center_id: Uuid,
    pub business_id: Option<Uuid>,
    pub check_in_time: DateTime<Utc>,
    pub status: CheckInStatus,
    pub credits_spent: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckOut {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub center_id: Uuid,
    pub check_in_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// History row joined with the visited center
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VisitHistoryEntry {
    pub id: Uuid,
    pub center_id: Uuid,
    pub center_name: String,
    pub center_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MemberCheckInRequest {
    pub member_id: Uuid,
    pub center_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UserCheckInRequest {
    pub center_id: Uuid,
}

/// Either the scanned QR string or the explicit pair it encodes
#[derive(Debug, Deserialize)]
pub struct ScanConfirmRequest {
    pub payload: Option<String>,
    pub user_id: Option<Uuid>,
    pub center_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct QrCheckInResponse {
    pub qr_payload: String,
    pub expires_at: DateTime<Utc>,
    pub center_id: Uuid,
    pub credit_required: i32,
    pub flex_credit: i32,
}

#[derive(Debug, Serialize)]
pub struct ScanConfirmResponse {
    pub check_in: CheckIn,
    pub remaining_flex_credit: i32,
}

#[derive(Debug, Serialize)]
pub struct UserCheckOutResponse {
    pub check_out: CheckOut,
    pub qr_payload: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

// ============================================================================
// USER PAYMENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_id: Option<Uuid>,
    pub amount: f64,
    pub currency: String,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_id: Option<Uuid>,
    pub amount: f64,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    #[validate(range(min = 1.0, max = 10000.0))]
    pub amount: f64,
    pub payment_method: Option<String>,
    /// Business whose front desk took the top-up.
    pub business_id: Option<Uuid>,
}

impl TopUpRequest {
    /// One flex credit per whole dollar.
    pub fn credits(&self) -> i32 {
        self.amount.floor() as i32
    }

    pub fn into_new_payment(self, user_id: Uuid) -> NewPayment {
        let credits = self.credits();
        NewPayment {
            id: Uuid::new_v4(),
            user_id,
            business_id: self.business_id,
            amount: self.amount,
            payment_type: PaymentType::FlexCredit,
            status: PaymentStatus::Completed,
            payment_method: self.payment_method.unwrap_or_else(|| "card".to_string()),
            description: Some(format!("Flex credit top-up: {credits} credits")),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubscriptionRequest {
    #[validate(length(min = 1, max = 50))]
    pub plan_type: String,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    pub payment_method: Option<String>,
    pub business_id: Option<Uuid>,
}

impl SubscriptionRequest {
    pub fn into_new_payment(self, user_id: Uuid) -> NewPayment {
        NewPayment {
            id: Uuid::new_v4(),
            user_id,
            business_id: self.business_id,
            amount: self.amount,
            payment_type: PaymentType::Subscription,
            status: PaymentStatus::Completed,
            payment_method: self.payment_method.unwrap_or_else(|| "card".to_string()),
            description: Some(format!("Subscription: {}", self.plan_type)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub flex_credit: i32,
    pub balance: f64,
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct PaymentSummary {
    pub completed_payments: i64,
    pub total_revenue: f64,
    pub pending_payments: i64,
    pub failed_payments: i64,
}

// ============================================================================
// ACTIVITY (workouts, group activities, challenges)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workout_type: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub with_friends: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WorkoutRequest {
    #[validate(length(min = 1, max = 50))]
    pub workout_type: String,
    pub start_time: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 1440))]
    pub duration_minutes: i32,
    #[serde(default)]
    pub with_friends: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupActivity {
    pub id: Uuid,
    pub host_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GroupActivityRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserChallenge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChallengeRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub completed: bool,
}

// ============================================================================
// REWARDS
// ============================================================================

/// Catalog entry; `rule` is the stable key the progress engine matches on
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reward {
    pub id: Uuid,
    pub rule: String,
    pub name: String,
    pub description: String,
    pub points_required: i32,
    pub category: String,
    pub reward_type: String,
    pub reward_value: f64,
    pub reward_description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RewardRequest {
    #[validate(length(min = 1, max = 64))]
    pub rule: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: String,
    #[validate(range(min = 0))]
    pub points_required: i32,
    pub category: String,
    pub reward_type: String,
    #[validate(range(min = 0.0))]
    pub reward_value: f64,
    pub reward_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserReward {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reward_id: Uuid,
    pub progress: i64,
    pub total: i64,
    pub state: RewardState,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// User reward joined with its catalog entry
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRewardDetail {
    pub id: Uuid,
    pub reward_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub reward_description: String,
    pub progress: i64,
    pub total: i64,
    pub state: RewardState,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct UserPoints {
    pub available_points: i32,
    pub total_points: i32,
}

// ============================================================================
// BOOKINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub business_id: Uuid,
    pub member_id: Uuid,
    pub center_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time_slot: String,
    pub activity: Option<String>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub member_id: Uuid,
    pub center_id: Option<Uuid>,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 50))]
    pub time_slot: String,
    #[validate(length(max = 120))]
    pub activity: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectBookingRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct BookingCounts {
    pub total: i64,
    pub approved: i64,
    pub rejected: i64,
    pub pending: i64,
}

// ============================================================================
// TRANSACTIONS / RECONCILIATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub business_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub payment_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: f64,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub status: Option<TransactionStatus>,
    #[validate(length(max = 120))]
    pub reference: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TransactionTypeTotal {
    pub transaction_type: TransactionType,
    pub count: i64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reconciliation {
    pub id: Uuid,
    pub business_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub expected_total: f64,
    pub actual_total: Option<f64>,
    pub variance: Option<f64>,
    pub status: ReconciliationStatus,
    pub notes: Option<String>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReconciliationLineItem {
    pub id: Uuid,
    pub reconciliation_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub expected_amount: f64,
    pub actual_amount: Option<f64>,
    pub status: LineItemStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReconciliationRequest {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub expected_total: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReconciliationStatusRequest {
    pub status: ReconciliationStatus,
    pub actual_total: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct ReconciliationSummary {
    pub total_reconciliations: i64,
    pub completed: i64,
    pub pending: i64,
    pub total_expected: f64,
    pub total_actual: f64,
    pub total_variance: f64,
}

// ============================================================================
// ADVERTISEMENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Advertisement {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: AdStatus,
    pub clicks: i64,
    pub views: i64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdvertisementRequest {
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(url)]
    pub target_url: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl CreateAdvertisementRequest {
    pub fn validate_business_rules(&self) -> Result<(), String> {
        if self.start_date > self.end_date {
            return Err("start_date must be before end_date".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct AdStatusRequest {
    pub status: AdStatus,
}

// ============================================================================
// SHARED QUERY / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub days: Option<i64>,
    pub period_days: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Generic API response wrapper for successful responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!(
            "PAID".parse::<MemberPaymentStatus>().unwrap(),
            MemberPaymentStatus::Paid
        );
        assert_eq!(
            " suspended ".parse::<MembershipStatus>().unwrap(),
            MembershipStatus::Suspended
        );
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "late".parse::<MemberPaymentStatus>().unwrap_err();
        assert!(err.contains("paid, unpaid, overdue"));
        assert!("frozen".parse::<MembershipStatus>().is_err());
    }

    #[test]
    fn test_new_member_defaults() {
        let request = CreateMemberRequest {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone: None,
            membership_type: None,
        };
        let member = request.into_new_member(Uuid::new_v4());
        assert_eq!(member.payment_status, MemberPaymentStatus::Unpaid);
        assert_eq!(member.membership_status, MembershipStatus::Active);
        assert!(member.is_active);
        assert_eq!(member.membership_type, "standard");
    }

    #[test]
    fn test_top_up_grants_one_credit_per_dollar() {
        let business_id = Uuid::new_v4();
        let request = TopUpRequest {
            amount: 25.75,
            payment_method: None,
            business_id: Some(business_id),
        };
        assert_eq!(request.credits(), 25);
        let payment = request.into_new_payment(Uuid::new_v4());
        assert_eq!(payment.business_id, Some(business_id));
        assert_eq!(payment.payment_type, PaymentType::FlexCredit);
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.payment_method, "card");
    }

    #[test]
    fn test_advertisement_dates_checked() {
        let now = Utc::now();
        let request = CreateAdvertisementRequest {
            title: "Spring promo".into(),
            description: None,
            image_url: None,
            target_url: None,
            start_date: now,
            end_date: now - chrono::Duration::days(1),
        };
        assert!(request.validate_business_rules().is_err());
    }

    #[test]
    fn test_enum_wire_format() {
        let json = serde_json::to_string(&ReconciliationStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let ty: PaymentType = serde_json::from_str("\"flex_credit\"").unwrap();
        assert_eq!(ty, PaymentType::FlexCredit);
    }
}
