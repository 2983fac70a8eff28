use crate::{
    activity_log::ActivityLog,
    error::{
        ClientError,
        Result,
    },
};
use alloy::primitives::Address;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Where the lottery contract lives and its interface definition.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractDescriptor {
    /// Exactly as served.
    pub address: String,
    pub abi: Value,
    contract_address: Address,
}

impl ContractDescriptor {
    pub fn new(address: impl Into<String>, abi: Value) -> Result<Self> {
        let address = address.into();
        let contract_address = Address::from_str(address.trim()).map_err(|e| {
            ClientError::resolution(format!("invalid contract address '{address}': {e}"))
        })?;
        if !abi.is_array() {
            return Err(ClientError::resolution(
                "contract ABI is not a JSON array of interface items",
            ));
        }
        Ok(Self {
            address,
            abi,
            contract_address,
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Interprets a contract info response.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Result<Self> {
        if !status.is_success() {
            let reason = match serde_json::from_slice::<ErrorDto>(body) {
                Ok(dto) => dto.error,
                Err(_) => format!("contract info endpoint responded with {status}"),
            };
            return Err(ClientError::Resolution { reason });
        }
        let dto: ContractInfoDto = serde_json::from_slice(body).map_err(|e| {
            ClientError::resolution(format!("invalid contract info payload: {e}"))
        })?;
        Self::new(dto.address, dto.abi)
    }
}

#[derive(Deserialize)]
struct ContractInfoDto {
    address: String,
    abi: Value,
}

#[derive(Deserialize)]
struct ErrorDto {
    error: String,
}

#[derive(Clone)]
pub struct ContractDirectory {
    url: String,
    http: reqwest::Client,
    log: ActivityLog,
}

impl ContractDirectory {
    pub fn new(url: impl Into<String>, log: ActivityLog) -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            ClientError::resolution(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self {
            url: url.into(),
            http,
            log,
        })
    }

    pub async fn resolve(&self) -> Result<ContractDescriptor> {
        match self.fetch().await {
            Ok(descriptor) => {
                self.log.append(format!(
                    "Contract info loaded. Address: {}",
                    descriptor.address
                ));
                let missing = lottery_abi::missing_entries(&descriptor.abi);
                if !missing.is_empty() {
                    tracing::warn!(?missing, "contract ABI lacks expected entries");
                    self.log.append(format!(
                        "Warning: contract ABI does not declare {}",
                        missing.join(", ")
                    ));
                }
                Ok(descriptor)
            }
            Err(e) => {
                tracing::error!(error = %e, url = %self.url, "contract info resolution failed");
                self.log.append(format!("Error: {e}"));
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<ContractDescriptor> {
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ClientError::resolution(format!("contract info request failed: {e}")))?;
        let status = res.status();
        let bytes = res.bytes().await.map_err(|e| {
            ClientError::resolution(format!("failed to read contract info response: {e}"))
        })?;
        ContractDescriptor::from_response(status, &bytes)
    }
}
