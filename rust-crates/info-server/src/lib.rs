use actix_web::{
    App,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    web,
};
use anyhow::Context;
use deployments::ContractInfoStore;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    thread::JoinHandle,
};

pub const CONTRACT_INFO_ROUTE: &str = "/api/contract-info";
pub const NOT_DEPLOYED_MESSAGE: &str =
    "Contract not deployed yet. Register one with `info-server register`";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ContractInfoServer {
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ContractInfoServer {
    /// Serves the store on 127.0.0.1, on an ephemeral port when `port` is `None`.
    pub fn start(store: ContractInfoStore, port: Option<u16>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for contract info")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!(
            "contract info listening on {}{} (record file {})",
            base_url,
            CONTRACT_INFO_ROUTE,
            store.path().display()
        );

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(store.clone()))
                .route(CONTRACT_INFO_ROUTE, web::get().to(handle_contract_info))
        })
        .workers(1)
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn contract_info_url(&self) -> String {
        format!("{}{}", self.base_url, CONTRACT_INFO_ROUTE)
    }
}

impl Drop for ContractInfoServer {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn handle_contract_info(store: web::Data<ContractInfoStore>) -> HttpResponse {
    tracing::info!("received contract info request");
    match store.load() {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => HttpResponse::NotFound().json(ErrorBody {
            error: NOT_DEPLOYED_MESSAGE.to_string(),
        }),
        Err(e) => {
            tracing::error!(error = %e, "failed to load contract info record");
            HttpResponse::InternalServerError().json(ErrorBody {
                error: format!("{e:#}"),
            })
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use deployments::{
        ContractInfoRecord,
        register_contract,
    };
    use reqwest::StatusCode;
    use serde_json::json;
    use tempdir::TempDir;

    #[tokio::test]
    async fn contract_info__registered_contract__is_served() {
        // given
        let dir = TempDir::new("info").unwrap();
        let store = ContractInfoStore::new(dir.path().join("contract_info.json"));
        let abi = json!([{ "type": "function", "name": "getEntryFee", "inputs": [] }]);
        let expected = register_contract(
            &store,
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            abi,
        )
        .unwrap();
        let server = ContractInfoServer::start(store, None).unwrap();

        // when
        let response = reqwest::get(server.contract_info_url()).await.unwrap();

        // then
        assert_eq!(response.status(), StatusCode::OK);
        let actual: ContractInfoRecord = response.json().await.unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn contract_info__nothing_registered__responds_not_found_with_error() {
        // given
        let dir = TempDir::new("info").unwrap();
        let store = ContractInfoStore::new(dir.path().join("contract_info.json"));
        let server = ContractInfoServer::start(store, None).unwrap();

        // when
        let response = reqwest::get(server.contract_info_url()).await.unwrap();

        // then
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = response.json().await.unwrap();
        assert_eq!(body.error, NOT_DEPLOYED_MESSAGE);
    }

    #[tokio::test]
    async fn contract_info__corrupt_record__responds_server_error() {
        // given
        let dir = TempDir::new("info").unwrap();
        let path = dir.path().join("contract_info.json");
        std::fs::write(&path, b"[1, 2").unwrap();
        let server = ContractInfoServer::start(ContractInfoStore::new(path), None).unwrap();

        // when
        let response = reqwest::get(server.contract_info_url()).await.unwrap();

        // then
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = response.json().await.unwrap();
        assert!(body.error.contains("contract info"));
    }
}
