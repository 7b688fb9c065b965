use crate::api::client::{ChainResponse, HttpChainFetcher};
use crate::blockchain::{
    mine_pending, synchronize, Consensus, Ledger, MeasurementSubmission, MiningCommand,
    MiningCoordinator, MiningSettings, PeerRegistry, ProofOfWork, SharedLedger, SharedPeers,
};
use crate::config::NodeConfig;
use crate::error::LedgerError;
use crate::frontend::routes::render_ledger;
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State shared by every request handler and background task.
pub struct AppState<C: Consensus> {
    pub ledger: SharedLedger<C>,
    pub peers: SharedPeers,
    pub fetcher: HttpChainFetcher,
    pub mining: MiningSettings,
    pub peer_timeout: Duration,
}

impl AppState<ProofOfWork> {
    pub fn from_config(config: &NodeConfig) -> std::io::Result<Self> {
        let ledger = Ledger::new(
            ProofOfWork::new(config.difficulty),
            config.node_id.clone(),
            config.mempool_capacity,
        );

        let mut peers = PeerRegistry::new();
        for peer in &config.peers {
            if let Err(e) = peers.register(peer) {
                warn!(%peer, error = %e, "ignoring configured peer");
            }
        }

        let fetcher = HttpChainFetcher::new(config.peer_timeout())
            .map_err(std::io::Error::other)?;

        Ok(AppState {
            ledger: Arc::new(RwLock::new(ledger)),
            peers: Arc::new(RwLock::new(peers)),
            fetcher,
            mining: config.mining_settings(),
            peer_timeout: config.peer_timeout(),
        })
    }
}

#[derive(Deserialize)]
pub struct NodeRequest {
    nodes: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct RegisteredNodes {
    pub nodes: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct Acceptance {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ConsensusResult {
    pub replaced: bool,
    pub chain: Vec<crate::blockchain::Block>,
    pub length: usize,
}

#[derive(Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub length: usize,
}

fn error_response(err: &LedgerError) -> HttpResponse {
    let status = match err {
        _ if err.is_client_error() => StatusCode::BAD_REQUEST,
        LedgerError::StaleMiningResult => StatusCode::CONFLICT,
        LedgerError::MempoolFull { .. }
        | LedgerError::MiningCancelled
        | LedgerError::MiningExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(Acceptance {
        accepted: false,
        error: Some(err.to_string()),
    })
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(Acceptance {
        accepted: false,
        error: Some(err.to_string()),
    });
    InternalError::from_response(err, response).into()
}

pub async fn alive() -> impl Responder {
    HttpResponse::Ok().body("Node alive")
}

// Post /new_power_data: queues one measurement
pub async fn submit_measurement<C: Consensus>(
    data: web::Data<AppState<C>>,
    req: web::Json<MeasurementSubmission>,
) -> impl Responder {
    let result = data.ledger.write().submit_measurement(req.into_inner()).map(|_| ());
    match result {
        Ok(()) => HttpResponse::Created().json(Acceptance {
            accepted: true,
            error: None,
        }),
        Err(e) => {
            warn!(error = %e, "rejected measurement");
            error_response(&e)
        }
    }
}

// Get|Post /mine: seals pending measurements into a new block
pub async fn mine<C: Consensus>(data: web::Data<AppState<C>>) -> impl Responder {
    match mine_pending(&data.ledger, &data.mining).await {
        Ok(block) => HttpResponse::Ok().json(block),
        Err(e) => {
            warn!(error = %e, "mining failed");
            error_response(&e)
        }
    }
}

// Get /chain: Returns current chain
pub async fn get_chain<C: Consensus>(data: web::Data<AppState<C>>) -> impl Responder {
    let chain = data.ledger.read().chain().to_vec();
    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

pub async fn register_nodes<C: Consensus>(
    data: web::Data<AppState<C>>,
    req: web::Json<NodeRequest>,
) -> impl Responder {
    if req.nodes.is_empty() {
        return error_response(&LedgerError::InvalidPeerAddress(
            "please supply a list of nodes".to_string(),
        ));
    }

    let mut normalized = Vec::with_capacity(req.nodes.len());
    for node in &req.nodes {
        match crate::blockchain::peers::normalize_address(node) {
            Ok(address) => normalized.push(address),
            Err(e) => return error_response(&e),
        }
    }

    {
        let mut peers = data.peers.write();
        for address in &normalized {
            match peers.register(address) {
                Ok(true) => info!(peer = %address, "registered peer"),
                Ok(false) => debug!(peer = %address, "peer already registered"),
                Err(e) => return error_response(&e),
            }
        }
    }

    HttpResponse::Created().json(RegisteredNodes { nodes: normalized })
}

pub async fn get_nodes<C: Consensus>(data: web::Data<AppState<C>>) -> impl Responder {
    let nodes = data.peers.read().list();
    HttpResponse::Ok().json(RegisteredNodes { nodes })
}

// Get /consensus: adopt the longest valid chain among peers
pub async fn consensus<C: Consensus>(data: web::Data<AppState<C>>) -> impl Responder {
    match synchronize(&data.ledger, &data.peers, &data.fetcher, data.peer_timeout).await {
        Ok(resolution) => HttpResponse::Ok().json(ConsensusResult {
            replaced: resolution.replaced,
            length: resolution.chain.len(),
            chain: resolution.chain,
        }),
        Err(e) => error_response(&e),
    }
}

pub async fn validate<C: Consensus>(data: web::Data<AppState<C>>) -> impl Responder {
    let ledger = data.ledger.read();
    HttpResponse::Ok().json(ValidationResult {
        valid: ledger.is_valid(),
        length: ledger.chain().len(),
    })
}

pub fn configure_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/chain", web::get().to(get_chain::<ProofOfWork>))
        .route(
            "/new_power_data",
            web::post().to(submit_measurement::<ProofOfWork>),
        )
        .route("/mine", web::get().to(mine::<ProofOfWork>))
        .route("/mine", web::post().to(mine::<ProofOfWork>))
        .route("/nodes", web::get().to(get_nodes::<ProofOfWork>))
        .route(
            "/nodes/register",
            web::post().to(register_nodes::<ProofOfWork>),
        )
        .route("/consensus", web::get().to(consensus::<ProofOfWork>))
        .route("/validate", web::get().to(validate::<ProofOfWork>))
        .route("/alive", web::get().to(alive));
}

fn configure_frontend_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(render_ledger::<ProofOfWork>));
}

// Start server with the given configuration
pub async fn run_server(config: NodeConfig) -> std::io::Result<()> {
    let state = web::Data::new(AppState::from_config(&config)?);
    let address = config.bind_address();
    info!(
        %address,
        node_id = %config.node_id,
        difficulty = config.difficulty,
        "starting gridledger node"
    );

    if let Some(period) = config.sync_interval() {
        let consensus_data = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match synchronize(
                    &consensus_data.ledger,
                    &consensus_data.peers,
                    &consensus_data.fetcher,
                    consensus_data.peer_timeout,
                )
                .await
                {
                    Ok(resolution) if resolution.replaced => {
                        info!(length = resolution.chain.len(), "chain updated from peers")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "error synchronizing chain"),
                }
            }
        });
    }

    let mining_commands = if config.auto_mine_interval_ms > 0 {
        let (mut coordinator, commands) = MiningCoordinator::new(
            state.ledger.clone(),
            state.mining.clone(),
            config.auto_mine_interval_ms,
        );
        tokio::spawn(async move { coordinator.run().await });
        if commands.send(MiningCommand::StartMining).await.is_err() {
            warn!("mining coordinator exited before start");
        }
        Some(commands)
    } else {
        None
    };

    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure_api_routes)
            .configure(configure_frontend_routes)
    })
    .bind(address)?
    .run()
    .await;

    if let Some(commands) = mining_commands {
        let _ = commands.send(MiningCommand::Shutdown).await;
    }
    result
}
