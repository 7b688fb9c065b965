use crate::api::server::AppState;
use crate::blockchain::{Block, Consensus, Measurement};
use actix_web::{web, HttpResponse, Responder};
use askama::Template;
use chrono::{DateTime, Utc};

struct MeasurementView {
    station: String,
    voltage: String,
    current: String,
    power: String,
    metadata: String,
}

struct BlockView {
    index: u64,
    hash: String,
    previous_hash: String,
    nonce: u64,
    created: String,
    author: String,
    measurements: Vec<MeasurementView>,
}

#[derive(Template)]
#[template(path = "views/ledger.html")]
struct LedgerTemplate {
    blocks: Vec<BlockView>,
    nodes: Vec<String>,
    pending: usize,
    valid: bool,
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<&Measurement> for MeasurementView {
    fn from(m: &Measurement) -> Self {
        MeasurementView {
            station: m.node_id.clone(),
            voltage: join(&m.voltage_vector),
            current: join(&m.current_vector),
            power: join(&m.power_vector),
            metadata: m
                .metadata
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        BlockView {
            index: block.index,
            hash: block.hash.clone(),
            previous_hash: block.previous_hash.clone(),
            nonce: block.nonce,
            created: DateTime::<Utc>::from_timestamp(block.timestamp, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| block.timestamp.to_string()),
            author: block.node_id.clone().unwrap_or_else(|| "genesis".to_string()),
            measurements: block.measurements.iter().map(MeasurementView::from).collect(),
        }
    }
}

// Newest block first
pub async fn render_ledger<C: Consensus>(data: web::Data<AppState<C>>) -> impl Responder {
    let (blocks, pending, valid) = {
        let ledger = data.ledger.read();
        (
            ledger.chain().iter().rev().map(BlockView::from).collect::<Vec<_>>(),
            ledger.pending().len(),
            ledger.is_valid(),
        )
    };
    let nodes = data.peers.read().list();

    let template = LedgerTemplate {
        blocks,
        nodes,
        pending,
        valid,
    };

    match template.render() {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}
