use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEFAULT_INFO_FILE: &str = "app/contract_info.json";

/// What the contract info endpoint serves: where the lottery lives and how to talk to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractInfoRecord {
    pub address: String,
    pub abi: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,
}

impl ContractInfoRecord {
    pub fn new(address: impl Into<String>, abi: Value) -> Self {
        Self {
            address: address.into(),
            abi,
            registered_at: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContractInfoStore {
    path: PathBuf,
}

impl ContractInfoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` until a contract has been registered.
    pub fn load(&self) -> Result<Option<ContractInfoRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: &ContractInfoRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create info directory {}", parent.display())
            })?;
        }
        write_record(&self.path, record)
    }
}

/// Records a deployed contract's address and ABI, stamping the registration time.
pub fn register_contract(
    store: &ContractInfoStore,
    address: impl AsRef<str>,
    abi: Value,
) -> Result<ContractInfoRecord> {
    if !abi.is_array() {
        return Err(anyhow!("ABI must be a JSON array of interface items"));
    }
    let record = ContractInfoRecord {
        address: address.as_ref().trim().to_string(),
        abi,
        registered_at: Some(Utc::now().to_rfc3339()),
    };
    store.save(&record)?;
    Ok(record)
}

pub fn read_abi_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let data = fs::read(path)
        .with_context(|| format!("Failed to read ABI file {}", path.display()))?;
    let value: Value = serde_json::from_slice(&data)
        .with_context(|| format!("ABI file {} is not valid JSON", path.display()))?;
    // compiler artifacts wrap the interface as {"abi": [...], ...}
    match value {
        Value::Object(mut artifact) if artifact.contains_key("abi") => artifact
            .remove("abi")
            .ok_or_else(|| anyhow!("ABI artifact {} has no abi field", path.display())),
        other => Ok(other),
    }
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<ContractInfoRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).context("Failed to read contract info record")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<ContractInfoRecord>(&data).map(Some).map_err(|e| {
        anyhow!("Failed to parse contract info JSON; expected {{address, abi}}: {e}")
    })
}

fn write_record(path: impl AsRef<Path>, record: &ContractInfoRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize contract info record")?;
    fs::write(path.as_ref(), json).context("Failed to write contract info record")?;
    Ok(())
}
