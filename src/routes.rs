use actix_web::http::{header, StatusCode};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{AppError, SessionError};
use crate::schemas::{HostPaymentMethod, Person, PersonId};
use crate::session::ItemInput;
use crate::settlement::{Ledger, PartyStats, PersonSummary};
use crate::state::{mutate_blocking, AppState};
use crate::storage::{self, Party};
use crate::summary;

#[derive(Deserialize, Serialize)]
struct PersonNameJson {
    name: String,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct HostJson {
    person_id: Option<PersonId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostInfoJson {
    host: Option<Person>,
    payment_method: HostPaymentMethod,
    payment_label: &'static str,
}

#[derive(Deserialize)]
struct Confirmation {
    #[serde(default)]
    confirm: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryJson {
    people: Vec<PersonSummary>,
    total_bill: f64,
    stats: PartyStats,
}

fn error_response(err: AppError) -> HttpResponse {
    match err {
        AppError::Session(SessionError::PersonNotFound(_) | SessionError::ItemNotFound(_)) => {
            HttpResponse::NotFound().body(err.to_string())
        }
        AppError::Session(_) => HttpResponse::BadRequest().body(err.to_string()),
        AppError::Storage(_) | AppError::Blocking(_) => {
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

/// Freezes the current session as a party on the blocking pool.
async fn share_party(state: &web::Data<AppState>) -> Result<Party, AppError> {
    let state = state.clone();
    let party = web::block(move || storage::save_party(state.store(), &state.snapshot())).await??;
    Ok(party)
}

/// Reads a shared party on the blocking pool.
async fn find_party(state: &web::Data<AppState>, id: String) -> Result<Option<Party>, AppError> {
    let state = state.clone();
    let party = web::block(move || storage::load_party(state.store(), &id)).await??;
    Ok(party)
}

fn confirmation_required() -> HttpResponse {
    HttpResponse::build(StatusCode::PRECONDITION_REQUIRED)
        .body("This removes data, repeat the request with ?confirm=true")
}

fn attachment(file_name: &str) -> (header::HeaderName, String) {
    (
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{file_name}\""),
    )
}

#[get("/session")]
async fn get_session(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.snapshot())
}

#[delete("/session")]
async fn clear_session(
    state: web::Data<AppState>,
    query: web::Query<Confirmation>,
) -> HttpResponse {
    if !query.confirm {
        return confirmation_required();
    }
    let cleared = mutate_blocking(&state, |session| {
        session.clear_all();
        Ok::<_, SessionError>(())
    })
    .await;
    match cleared {
        Ok(()) => HttpResponse::Ok().body("Session cleared"),
        Err(err) => error_response(err),
    }
}

#[post("/onboarding/complete")]
async fn complete_onboarding(state: web::Data<AppState>) -> HttpResponse {
    let completed = mutate_blocking(&state, |session| {
        session.complete_onboarding();
        Ok::<_, SessionError>(())
    })
    .await;
    match completed {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => error_response(err),
    }
}

#[post("/people")]
async fn add_person(state: web::Data<AppState>, json: web::Json<PersonNameJson>) -> HttpResponse {
    let name = json.into_inner().name;
    match mutate_blocking(&state, move |session| session.add_person(&name)).await {
        Ok(person) => HttpResponse::Created().json(person),
        Err(err) => error_response(err),
    }
}

#[put("/people/{id}")]
async fn rename_person(
    state: web::Data<AppState>,
    id: web::Path<String>,
    json: web::Json<PersonNameJson>,
) -> HttpResponse {
    let (id, name) = (id.into_inner(), json.into_inner().name);
    match mutate_blocking(&state, move |session| session.rename_person(&id, &name)).await {
        Ok(person) => HttpResponse::Ok().json(person),
        Err(err) => error_response(err),
    }
}

#[delete("/people/{id}")]
async fn delete_person(
    state: web::Data<AppState>,
    id: web::Path<String>,
    query: web::Query<Confirmation>,
) -> HttpResponse {
    if !query.confirm {
        return confirmation_required();
    }
    let id = id.into_inner();
    match mutate_blocking(&state, move |session| session.delete_person(&id)).await {
        Ok(removal) => HttpResponse::Ok().json(removal),
        Err(err) => error_response(err),
    }
}

#[delete("/people")]
async fn clear_people(
    state: web::Data<AppState>,
    query: web::Query<Confirmation>,
) -> HttpResponse {
    if !query.confirm {
        return confirmation_required();
    }
    let cleared = mutate_blocking(&state, |session| {
        session.clear_people();
        Ok::<_, SessionError>(())
    })
    .await;
    match cleared {
        Ok(()) => HttpResponse::Ok().body("People cleared"),
        Err(err) => error_response(err),
    }
}

#[get("/people/{id}/payment-request")]
async fn payment_request(state: web::Data<AppState>, id: web::Path<String>) -> HttpResponse {
    let session = state.snapshot();
    if session.person(&id).is_none() {
        return HttpResponse::NotFound().body("Couldn't find the desired person");
    }
    let Some(host) = session.host() else {
        return HttpResponse::NotFound().body("No host has been selected");
    };
    let total = Ledger::new(&session.people, &session.items).total_for_person(&id);
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(summary::payment_request_text(
            &host.name,
            total,
            &session.host_payment_method,
        ))
}

#[post("/items")]
async fn add_item(state: web::Data<AppState>, json: web::Json<ItemInput>) -> HttpResponse {
    let input = json.into_inner();
    match mutate_blocking(&state, move |session| session.add_item(&input)).await {
        Ok(item) => HttpResponse::Created().json(item),
        Err(err) => error_response(err),
    }
}

#[put("/items/{id}")]
async fn edit_item(
    state: web::Data<AppState>,
    id: web::Path<String>,
    json: web::Json<ItemInput>,
) -> HttpResponse {
    let (id, input) = (id.into_inner(), json.into_inner());
    match mutate_blocking(&state, move |session| session.edit_item(&id, &input)).await {
        Ok(item) => HttpResponse::Ok().json(item),
        Err(err) => error_response(err),
    }
}

#[delete("/items/{id}")]
async fn delete_item(
    state: web::Data<AppState>,
    id: web::Path<String>,
    query: web::Query<Confirmation>,
) -> HttpResponse {
    if !query.confirm {
        return confirmation_required();
    }
    let id = id.into_inner();
    match mutate_blocking(&state, move |session| session.delete_item(&id)).await {
        Ok(item) => HttpResponse::Ok().json(item),
        Err(err) => error_response(err),
    }
}

#[delete("/items")]
async fn clear_items(
    state: web::Data<AppState>,
    query: web::Query<Confirmation>,
) -> HttpResponse {
    if !query.confirm {
        return confirmation_required();
    }
    let cleared = mutate_blocking(&state, |session| {
        session.clear_items();
        Ok::<_, SessionError>(())
    })
    .await;
    match cleared {
        Ok(()) => HttpResponse::Ok().body("Items cleared"),
        Err(err) => error_response(err),
    }
}

#[get("/host")]
async fn get_host(state: web::Data<AppState>) -> HttpResponse {
    let session = state.snapshot();
    HttpResponse::Ok().json(HostInfoJson {
        host: session.host().cloned(),
        payment_label: session.host_payment_method.kind.label(),
        payment_method: session.host_payment_method,
    })
}

#[put("/host")]
async fn set_host(state: web::Data<AppState>, json: web::Json<HostJson>) -> HttpResponse {
    let person_id = json.into_inner().person_id;
    let chosen = mutate_blocking(&state, move |session| {
        session.set_host(person_id.as_deref())?;
        Ok::<_, SessionError>(session.host_id.clone())
    })
    .await;
    match chosen {
        Ok(host_id) => HttpResponse::Ok().json(host_id),
        Err(err) => error_response(err),
    }
}

#[put("/host/payment-method")]
async fn set_payment_method(
    state: web::Data<AppState>,
    json: web::Json<HostPaymentMethod>,
) -> HttpResponse {
    let method = json.into_inner();
    let saved = mutate_blocking(&state, move |session| {
        session.set_payment_method(method.clone());
        Ok::<_, SessionError>(method)
    })
    .await;
    match saved {
        Ok(method) => HttpResponse::Ok().json(method),
        Err(err) => error_response(err),
    }
}

#[get("/summary")]
async fn get_summary(state: web::Data<AppState>) -> HttpResponse {
    let session = state.snapshot();
    let ledger = Ledger::new(&session.people, &session.items);
    HttpResponse::Ok().json(SummaryJson {
        people: ledger.summarize(),
        total_bill: ledger.total_bill(),
        stats: ledger.party_stats(),
    })
}

#[get("/summary/share-text")]
async fn share_text(state: web::Data<AppState>) -> HttpResponse {
    let session = state.snapshot();
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(summary::share_text(&session.people, &session.items))
}

#[get("/export/json")]
async fn export_json(state: web::Data<AppState>) -> HttpResponse {
    let session = state.snapshot();
    let now = Utc::now();
    match serde_json::to_string_pretty(&summary::export_snapshot(&session, now)) {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/json")
            .insert_header(attachment(&summary::export_file_name("json", now)))
            .body(body),
        Err(err) => {
            error!(error = %err, "failed to encode export");
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

#[get("/export/csv")]
async fn export_csv(state: web::Data<AppState>) -> HttpResponse {
    let session = state.snapshot();
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(attachment(&summary::export_file_name("csv", Utc::now())))
        .body(summary::export_csv(&session.people, &session.items))
}

#[post("/party")]
async fn create_party(state: web::Data<AppState>) -> HttpResponse {
    match share_party(&state).await {
        Ok(party) => {
            info!(party_id = %party.id, "party shared");
            HttpResponse::Created().json(party)
        }
        Err(err) => error_response(err),
    }
}

#[get("/party/{id}")]
async fn get_party(state: web::Data<AppState>, id: web::Path<String>) -> HttpResponse {
    match find_party(&state, id.into_inner()).await {
        Ok(Some(party)) => HttpResponse::Ok().json(party),
        Ok(None) => HttpResponse::NotFound().body("Couldn't find the desired party"),
        Err(err) => error_response(err),
    }
}

#[get("/party/{id}/person/{person_id}")]
async fn get_party_person(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (id, person_id) = path.into_inner();
    match find_party(&state, id).await {
        Ok(Some(party)) => match party.bill_summary.get(&person_id) {
            Some(bill) => HttpResponse::Ok().json(bill),
            None => HttpResponse::NotFound().body("Couldn't find the desired person"),
        },
        Ok(None) => HttpResponse::NotFound().body("Couldn't find the desired party"),
        Err(err) => error_response(err),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_session)
        .service(clear_session)
        .service(complete_onboarding)
        .service(add_person)
        .service(clear_people)
        .service(rename_person)
        .service(delete_person)
        .service(payment_request)
        .service(add_item)
        .service(clear_items)
        .service(edit_item)
        .service(delete_item)
        .service(set_payment_method)
        .service(get_host)
        .service(set_host)
        .service(get_summary)
        .service(share_text)
        .service(export_json)
        .service(export_csv)
        .service(create_party)
        .service(get_party_person)
        .service(get_party);
}
