use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three fungible resources handed out by the bot.
/// Asset ids on the ledger are fixed: 1/2/3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Dp,
    Oil,
    Energy,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl ResourceKind {
    /// Transfer order within a batch row
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Dp, ResourceKind::Oil, ResourceKind::Energy];

    pub fn asset_id(&self) -> u32 {
        match self {
            ResourceKind::Dp => 1,
            ResourceKind::Oil => 2,
            ResourceKind::Energy => 3,
        }
    }

    pub fn from_asset_id(asset_id: u32) -> Option<Self> {
        match asset_id {
            1 => Some(ResourceKind::Dp),
            2 => Some(ResourceKind::Oil),
            3 => Some(ResourceKind::Energy),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::Dp => "DP",
            ResourceKind::Oil => "Oil",
            ResourceKind::Energy => "Energy",
        }
    }

    /// Column carrying this resource in a batch file
    pub fn column(&self) -> &'static str {
        match self {
            ResourceKind::Dp => "Points",
            ResourceKind::Oil => "OilPoints",
            ResourceKind::Energy => "EnergyPoints",
        }
    }
}

/// Opaque custodial wallet id returned by the authentication service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletHandle(String);

impl WalletHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fungible balances of one wallet, one amount per resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBalance {
    pub dp: Decimal,
    pub oil: Decimal,
    pub energy: Decimal,
}

impl PoolBalance {
    pub fn new(dp: Decimal, oil: Decimal, energy: Decimal) -> Self {
        Self { dp, oil, energy }
    }

    pub fn get(&self, kind: ResourceKind) -> Decimal {
        match kind {
            ResourceKind::Dp => self.dp,
            ResourceKind::Oil => self.oil,
            ResourceKind::Energy => self.energy,
        }
    }

    fn slot_mut(&mut self, kind: ResourceKind) -> &mut Decimal {
        match kind {
            ResourceKind::Dp => &mut self.dp,
            ResourceKind::Oil => &mut self.oil,
            ResourceKind::Energy => &mut self.energy,
        }
    }

    pub fn debit(&mut self, kind: ResourceKind, amount: Decimal) {
        *self.slot_mut(kind) -= amount;
    }

    /// Every resource strictly positive
    pub fn is_funded(&self) -> bool {
        ResourceKind::ALL.iter().all(|kind| self.get(*kind) > Decimal::ZERO)
    }

    pub fn covers(&self, kind: ResourceKind, amount: Decimal) -> bool {
        amount <= self.get(kind)
    }

    /// Builds a balance from the ledger's per-asset entries.
    /// Unknown asset ids are ignored; missing resources stay at zero.
    pub fn from_entries(entries: &[FungibleBalance]) -> Self {
        let mut balance = PoolBalance::default();
        for entry in entries {
            if let Some(kind) = ResourceKind::from_asset_id(entry.asset_id) {
                *balance.slot_mut(kind) = entry.balance;
            }
        }
        balance
    }
}

impl fmt::Display for PoolBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DP {} | Oil {} | Energy {}", self.dp, self.oil, self.energy)
    }
}

// ---- Response schemas ----

/// `GET /authenticate/{external_account_id}`
#[derive(Debug, Deserialize)]
pub struct AuthenticateResponse {
    #[serde(default)]
    pub data: Option<AuthenticateData>,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticateData {
    #[serde(default)]
    pub thx: Option<ThxAccount>,
}

#[derive(Debug, Deserialize)]
pub struct ThxAccount {
    #[serde(default)]
    pub id_wallet: Option<String>,
}

impl AuthenticateResponse {
    pub fn id_wallet(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.thx.as_ref())
            .and_then(|t| t.id_wallet.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// `GET /id_wallet/{wallet}/{network}/fts`
#[derive(Debug, Deserialize)]
pub struct FtsResponse {
    #[serde(default)]
    pub result: FtsResult,
}

#[derive(Debug, Default, Deserialize)]
pub struct FtsResult {
    #[serde(default)]
    pub non_native_ft_balances: Vec<FungibleBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FungibleBalance {
    pub asset_id: u32,
    #[serde(deserialize_with = "deserialize_amount")]
    pub balance: Decimal,
}

/// `POST /me/{network}/ft/transfer`
#[derive(Debug, Serialize)]
pub struct TransferRequest<'a> {
    pub receiver_id_wallet_address: &'a str,
    pub transfer_value_human: Decimal,
    pub native: bool,
    pub asset_id: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(serde_json::Number),
    Text(String),
}

/// Ledger amounts show up both as JSON numbers and as strings
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => n.to_string(),
        RawAmount::Text(s) => s,
    };
    parse_amount(&text).map_err(serde::de::Error::custom)
}

/// Parses a decimal amount in plain or scientific notation
pub fn parse_amount(text: &str) -> Result<Decimal, rust_decimal::Error> {
    let text = text.trim();
    Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_asset_id_mapping() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_asset_id(kind.asset_id()), Some(kind));
        }
        assert_eq!(ResourceKind::from_asset_id(4), None);
        assert_eq!(ResourceKind::Oil.column(), "OilPoints");
    }

    #[test]
    fn test_balance_entries_default_to_zero() {
        let body = r#"{"result":{"non_native_ft_balances":[
            {"asset_id":1,"balance":250},
            {"asset_id":3,"balance":"12.5"},
            {"asset_id":9,"balance":1}
        ]}}"#;
        let parsed: FtsResponse = serde_json::from_str(body).unwrap();
        let balance = PoolBalance::from_entries(&parsed.result.non_native_ft_balances);

        assert_eq!(balance, PoolBalance::new(dec!(250), Decimal::ZERO, dec!(12.5)));
        assert!(!balance.is_funded());
    }

    #[test]
    fn test_missing_result_is_empty_balance() {
        let parsed: FtsResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(
            PoolBalance::from_entries(&parsed.result.non_native_ft_balances),
            PoolBalance::default()
        );
    }

    #[test]
    fn test_authenticate_response_wallet() {
        let ok: AuthenticateResponse =
            serde_json::from_str(r#"{"data":{"thx":{"id_wallet":"5Abc"}}}"#).unwrap();
        assert_eq!(ok.id_wallet(), Some("5Abc"));

        let missing: AuthenticateResponse =
            serde_json::from_str(r#"{"data":{"user":"x"}}"#).unwrap();
        assert_eq!(missing.id_wallet(), None);
    }

    #[test]
    fn test_debit_and_cover() {
        let mut pool = PoolBalance::new(dec!(100), dec!(100), dec!(100));
        assert!(pool.covers(ResourceKind::Dp, dec!(100)));
        pool.debit(ResourceKind::Dp, dec!(60));
        assert!(!pool.covers(ResourceKind::Dp, dec!(60)));
        assert_eq!(pool.get(ResourceKind::Dp), dec!(40));
    }

    #[test]
    fn test_parse_amount_forms() {
        assert_eq!(parse_amount(" 42 ").unwrap(), dec!(42));
        assert_eq!(parse_amount("1e3").unwrap(), dec!(1000));
        assert!(parse_amount("lots").is_err());
    }
}
