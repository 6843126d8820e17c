//! Member registry routes

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use gymtrack_shared::{next_member_number, MemberStatus, Pagination};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::payments::new_receipt_number;
use super::subscriptions::end_date_for;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListMembersQuery {
    pub search: Option<String>,
    pub status: Option<MemberStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMemberRequest {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
    /// When present, an initial subscription (and cash payment) is created
    pub package_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    pub member_ids: Vec<Uuid>,
    pub status: MemberStatus,
}

#[derive(Debug, Serialize)]
pub struct BulkStatusResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct MemberListResponse {
    pub members: Vec<MemberResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MemberResponse {
    pub id: Uuid,
    pub member_number: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub notes: Option<String>,
    pub status: MemberStatus,
    pub joined_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

const MEMBER_COLUMNS: &str = "id, member_number, full_name, phone, email, national_id, \
     date_of_birth, gender, address, emergency_contact, emergency_phone, notes, status, \
     joined_at, created_at";

// =============================================================================
// Handlers
// =============================================================================

/// List members with search, status filter, and pagination
pub async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<ListMembersQuery>,
) -> ApiResult<Json<MemberListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let search = query
        .search
        .as_deref()
        .map(|s| format!("%{}%", s.trim()))
        .unwrap_or_else(|| "%".to_string());

    let members: Vec<MemberResponse> = sqlx::query_as(&format!(
        r#"
        SELECT {MEMBER_COLUMNS}
        FROM members
        WHERE (full_name ILIKE $1 OR member_number ILIKE $1 OR phone ILIKE $1
               OR COALESCE(email, '') ILIKE $1)
          AND ($2::VARCHAR IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(&search)
    .bind(query.status)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM members
        WHERE (full_name ILIKE $1 OR member_number ILIKE $1 OR phone ILIKE $1
               OR COALESCE(email, '') ILIKE $1)
          AND ($2::VARCHAR IS NULL OR status = $2)
        "#,
    )
    .bind(&search)
    .bind(query.status)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(MemberListResponse {
        members,
        pagination: Pagination::new(total, page, limit),
    }))
}

/// Register a new member, assigning the next member number.
/// When a package is supplied, an initial active subscription and a completed
/// cash payment are created in the same transaction.
pub async fn create_member(
    State(state): State<AppState>,
    Json(req): Json<CreateMemberRequest>,
) -> ApiResult<(StatusCode, Json<MemberResponse>)> {
    if req.full_name.trim().is_empty() {
        return Err(ApiError::Validation("Full name is required".to_string()));
    }
    if req.phone.trim().is_empty() {
        return Err(ApiError::Validation("Phone is required".to_string()));
    }

    let mut tx = state.pool.begin().await?;

    // Member numbers are issued by scanning the current maximum; the unique
    // constraint catches the rare concurrent insert.
    let last: Option<(String,)> = sqlx::query_as(
        "SELECT member_number FROM members ORDER BY LENGTH(member_number) DESC, member_number DESC LIMIT 1",
    )
    .fetch_optional(&mut *tx)
    .await?;
    let member_number = next_member_number(last.as_ref().map(|(n,)| n.as_str()));

    let member: MemberResponse = sqlx::query_as(&format!(
        r#"
        INSERT INTO members (id, member_number, full_name, phone, email, national_id,
                             date_of_birth, gender, address, emergency_contact,
                             emergency_phone, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'active')
        RETURNING {MEMBER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&member_number)
    .bind(req.full_name.trim())
    .bind(req.phone.trim())
    .bind(&req.email)
    .bind(&req.national_id)
    .bind(req.date_of_birth)
    .bind(&req.gender)
    .bind(&req.address)
    .bind(&req.emergency_contact)
    .bind(&req.emergency_phone)
    .bind(&req.notes)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(package_id) = req.package_id {
        let pkg: Option<(i32, i64, String)> = sqlx::query_as(
            "SELECT duration_days, price_cents, name FROM packages WHERE id = $1 AND is_active",
        )
        .bind(package_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (duration_days, price_cents, package_name) =
            pkg.ok_or_else(|| ApiError::BadRequest("Package not found".to_string()))?;

        let start_date = OffsetDateTime::now_utc().date();
        let end_date = end_date_for(start_date, duration_days);

        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, member_id, package_id, start_date, end_date,
                                       amount_cents, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'active')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member.id)
        .bind(package_id)
        .bind(start_date)
        .bind(end_date)
        .bind(price_cents)
        .execute(&mut *tx)
        .await?;

        // Free packages produce no payment and no ledger entry
        if price_cents > 0 {
            let receipt = new_receipt_number();
            sqlx::query(
                r#"
                INSERT INTO payments (id, member_id, amount_cents, method, status,
                                      receipt_number, description, paid_at)
                VALUES ($1, $2, $3, 'cash', 'completed', $4, $5, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(member.id)
            .bind(price_cents)
            .bind(&receipt)
            .bind(format!("Subscription {}", package_name))
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO transactions (id, type, amount_cents, member_id, description, reference)
                VALUES ($1, 'income', $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(price_cents)
            .bind(member.id)
            .bind(format!("Payment - {}", receipt))
            .bind(&receipt)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    tracing::info!(member_id = %member.id, member_number = %member.member_number, "Member registered");

    Ok((StatusCode::CREATED, Json(member)))
}

/// Get a member by ID
pub async fn get_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Json<MemberResponse>> {
    let member: MemberResponse = sqlx::query_as(&format!(
        "SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1"
    ))
    .bind(member_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(member))
}

/// Update a member's profile or status
pub async fn update_member(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<Json<MemberResponse>> {
    let member: MemberResponse = sqlx::query_as(&format!(
        r#"
        UPDATE members
        SET full_name = COALESCE($2, full_name),
            phone = COALESCE($3, phone),
            email = COALESCE($4, email),
            address = COALESCE($5, address),
            emergency_contact = COALESCE($6, emergency_contact),
            emergency_phone = COALESCE($7, emergency_phone),
            notes = COALESCE($8, notes),
            status = COALESCE($9, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {MEMBER_COLUMNS}
        "#
    ))
    .bind(member_id)
    .bind(&req.full_name)
    .bind(&req.phone)
    .bind(&req.email)
    .bind(&req.address)
    .bind(&req.emergency_contact)
    .bind(&req.emergency_phone)
    .bind(&req.notes)
    .bind(req.status)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(member))
}

/// Set the status of several members at once
pub async fn bulk_update_status(
    State(state): State<AppState>,
    Json(req): Json<BulkStatusRequest>,
) -> ApiResult<Json<BulkStatusResponse>> {
    if req.member_ids.is_empty() {
        return Err(ApiError::Validation(
            "At least one member ID is required".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE members SET status = $2, updated_at = NOW() WHERE id = ANY($1)",
    )
    .bind(&req.member_ids)
    .bind(req.status)
    .execute(&state.pool)
    .await?;

    let updated = result.rows_affected();
    tracing::info!(updated, status = ?req.status, "Bulk member status update");

    Ok(Json(BulkStatusResponse { updated }))
}

/// Delete a member and all dependent records. Admin only.
pub async fn delete_member(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(member_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !auth_user.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let result = sqlx::query("DELETE FROM members WHERE id = $1")
        .bind(member_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use sqlx::PgPool;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = gymtrack_shared::create_pool(&url, 3).await.unwrap();
        gymtrack_shared::run_migrations(&pool).await.unwrap();
        pool
    }

    fn test_state(pool: PgPool) -> AppState {
        AppState::new(
            pool,
            Config {
                bind_address: "127.0.0.1:0".to_string(),
                database_url: String::new(),
                database_max_connections: 3,
                jwt_secret: "unit-test-secret-at-least-32-characters!!".to_string(),
                jwt_expiry_hours: 24,
                stripe_secret_key: String::new(),
                stripe_webhook_secret: String::new(),
                enable_card_payments: false,
            },
        )
    }

    fn register_request(full_name: &str) -> CreateMemberRequest {
        CreateMemberRequest {
            full_name: full_name.to_string(),
            phone: "555-0100".to_string(),
            email: None,
            national_id: None,
            date_of_birth: None,
            gender: None,
            address: None,
            emergency_contact: None,
            emergency_phone: None,
            notes: None,
            package_id: None,
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn bulk_status_update_touches_only_listed_members() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());

        let (_, Json(a)) = create_member(State(state.clone()), Json(register_request("Ada")))
            .await
            .unwrap();
        let (_, Json(b)) = create_member(State(state.clone()), Json(register_request("Grace")))
            .await
            .unwrap();
        let (_, Json(c)) = create_member(State(state.clone()), Json(register_request("Edsger")))
            .await
            .unwrap();

        let Json(result) = bulk_update_status(
            State(state),
            Json(BulkStatusRequest {
                member_ids: vec![a.id, b.id],
                status: MemberStatus::Inactive,
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.updated, 2);

        let (status,): (MemberStatus,) =
            sqlx::query_as("SELECT status FROM members WHERE id = $1")
                .bind(c.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, MemberStatus::Active);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn bulk_status_update_rejects_empty_list() {
        let pool = test_pool().await;
        let state = test_state(pool);

        let result = bulk_update_status(
            State(state),
            Json(BulkStatusRequest {
                member_ids: vec![],
                status: MemberStatus::Inactive,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn registering_with_free_package_records_no_payment() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());

        let package_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO packages (id, name, duration_days, price_cents) VALUES ($1, 'Trial Week', 7, 0)",
        )
        .bind(package_id)
        .execute(&pool)
        .await
        .unwrap();

        let mut req = register_request("Trial Member");
        req.package_id = Some(package_id);

        let (_, Json(member)) = create_member(State(state), Json(req)).await.unwrap();

        let (subscriptions,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE member_id = $1")
                .bind(member.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(subscriptions, 1);

        let (payments,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payments WHERE member_id = $1")
                .bind(member.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(payments, 0);
    }
}
