use super::serialize_as_duk;
use crate::cli::params::DatabaseParams;
use crate::Error;
use bitbreadcrumb_coins::Coins;
use bitcoin::{Amount, Txid};
use serde::Serialize;

#[derive(Debug, clap::Args)]
pub struct GetCoins {
    /// Transaction id.
    #[arg(index = 1)]
    pub txid: Txid,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub database_params: DatabaseParams,
}

impl GetCoins {
    pub fn execute(self) -> crate::Result<CoinsInfo> {
        let storage = self.database_params.open()?;
        let coins = storage
            .read_coins(&self.txid)?
            .ok_or(Error::NotFound(self.txid))?;
        Ok(CoinsInfo {
            txid: Some(self.txid),
            ..CoinsInfo::from(&coins)
        })
    }
}

#[derive(Debug, clap::Args)]
pub struct DecodeCoins {
    /// Hex encoded record as stored in the coins database.
    #[arg(index = 1)]
    pub input: String,
}

impl DecodeCoins {
    pub fn execute(self) -> crate::Result<CoinsInfo> {
        let input = self.input.trim();
        let input = input.strip_prefix("0x").unwrap_or(input);

        let bytes =
            hex::decode(input).map_err(|err| Error::Input(format!("Invalid hex: {err}")))?;

        let coins = Coins::decode_from_storage(&bytes)
            .map_err(|err| Error::Input(format!("Invalid coins record: {err}")))?;

        Ok(CoinsInfo {
            size: Some(bytes.len()),
            ..CoinsInfo::from(&coins)
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CoinsInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    txid: Option<Txid>,
    version: i32,
    coinbase: bool,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
    outputs: Vec<OutputInfo>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct OutputInfo {
    n: usize,
    #[serde(serialize_with = "serialize_as_duk")]
    value: Amount,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: String,
}

impl From<&Coins> for CoinsInfo {
    fn from(coins: &Coins) -> Self {
        let outputs = coins
            .outputs
            .iter()
            .enumerate()
            .filter_map(|(n, output)| {
                output.as_ref().map(|output| OutputInfo {
                    n,
                    value: output.value,
                    script_pubkey: hex::encode(output.script_pubkey.as_bytes()),
                })
            })
            .collect();

        Self {
            txid: None,
            version: coins.version,
            coinbase: coins.is_coinbase,
            height: coins.height,
            size: None,
            outputs,
        }
    }
}
