//! # Two-Tier SMS Balance
//!
//! Every client belongs to a reseller (`owner_user`). A message is paid for
//! twice: once from the client's wallet and once from the reseller's, so a
//! reseller can never send more on behalf of clients than they bought.
//!
//! ## Charging
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  package.prefix_based?                                                  │
//! │     yes ──► money slot   {region}_non_masking_balance                   │
//! │             cost = parts × non-masking charge for region                │
//! │     no  ──► quota slot   {region}_non_masking_message_amount            │
//! │             cost = parts                                                │
//! │                                                                         │
//! │  low balance  ⇔  client.slot ≤ cost  ∨  reseller.slot ≤ cost            │
//! │  low          ──► nothing changes                                       │
//! │  otherwise    ──► client.slot −= cost, reseller.slot −= cost            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A refund is the same charge applied in the other direction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

/// Note written on a balance log for a deduction.
pub const NOTE_DECREASE: &str = "decreasing balance";
/// Note written on a balance log for a refund.
pub const NOTE_INCREASE: &str = "increasing balance";

/// Mobile operator prefixes that carry their own package charge.
pub const OPERATOR_PREFIXES: [&str; 7] = ["013", "014", "015", "016", "017", "018", "019"];

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Local,
    International,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Local => "local",
            Region::International => "international",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    #[default]
    Prepaid,
    PostpaidLimited,
    PostpaidUnlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Reseller,
    Client,
}

// =============================================================================
// Wallet Slots
// =============================================================================

/// What a slot counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// Money in minor units.
    Balance,
    /// Prepaid message parts.
    Messages,
}

/// One of the eight counters in a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub region: Region,
    pub masking: bool,
    pub kind: SlotKind,
}

impl Slot {
    pub const fn new(region: Region, masking: bool, kind: SlotKind) -> Self {
        Self { region, masking, kind }
    }

    /// Column holding this slot in the wallet table.
    pub fn column(&self) -> &'static str {
        use Region::*;
        use SlotKind::*;
        match (self.region, self.masking, self.kind) {
            (Local, true, Balance) => "local_masking_balance",
            (Local, false, Balance) => "local_non_masking_balance",
            (Local, true, Messages) => "local_masking_message_amount",
            (Local, false, Messages) => "local_non_masking_message_amount",
            (International, true, Balance) => "international_masking_balance",
            (International, false, Balance) => "international_non_masking_balance",
            (International, true, Messages) => "international_masking_message_amount",
            (International, false, Messages) => "international_non_masking_message_amount",
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Balances and message quotas of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Wallet {
    pub local_masking_balance: Money,
    pub local_non_masking_balance: Money,
    pub local_masking_message_amount: i64,
    pub local_non_masking_message_amount: i64,
    pub international_masking_balance: Money,
    pub international_non_masking_balance: Money,
    pub international_masking_message_amount: i64,
    pub international_non_masking_message_amount: i64,
}

impl Wallet {
    fn slot_mut(&mut self, slot: Slot) -> SlotRef<'_> {
        use Region::*;
        use SlotKind::*;
        match (slot.region, slot.masking, slot.kind) {
            (Local, true, Balance) => SlotRef::Money(&mut self.local_masking_balance),
            (Local, false, Balance) => SlotRef::Money(&mut self.local_non_masking_balance),
            (Local, true, Messages) => SlotRef::Count(&mut self.local_masking_message_amount),
            (Local, false, Messages) => SlotRef::Count(&mut self.local_non_masking_message_amount),
            (International, true, Balance) => SlotRef::Money(&mut self.international_masking_balance),
            (International, false, Balance) => SlotRef::Money(&mut self.international_non_masking_balance),
            (International, true, Messages) => SlotRef::Count(&mut self.international_masking_message_amount),
            (International, false, Messages) => SlotRef::Count(&mut self.international_non_masking_message_amount),
        }
    }

    /// Raw value of a slot (minor units for money, parts for quotas).
    pub fn get(&self, slot: Slot) -> i64 {
        let mut copy = *self;
        match copy.slot_mut(slot) {
            SlotRef::Money(m) => m.minor(),
            SlotRef::Count(c) => *c,
        }
    }

    /// Adds `delta` to a slot and returns the updated wallet.
    pub fn adjusted(mut self, slot: Slot, delta: i64) -> Self {
        match self.slot_mut(slot) {
            SlotRef::Money(m) => *m += Money::from_minor(delta),
            SlotRef::Count(c) => *c += delta,
        }
        self
    }
}

enum SlotRef<'a> {
    Money(&'a mut Money),
    Count(&'a mut i64),
}

// =============================================================================
// Package
// =============================================================================

/// A price plan a reseller sells to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Package {
    pub id: String,
    pub name: String,
    pub owner_user_id: Option<String>,
    pub bill_type: BillType,
    pub is_deletable: bool,
    pub masking_national_charge: Money,
    pub non_masking_national_charge: Money,
    pub masking_international_charge: Money,
    pub non_masking_international_charge: Money,
    /// Bill money per part instead of prepaid message quota.
    pub prefix_based: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    pub fn non_masking_charge(&self, region: Region) -> Money {
        match region {
            Region::Local => self.non_masking_national_charge,
            Region::International => self.non_masking_international_charge,
        }
    }

    pub fn masking_charge(&self, region: Region) -> Money {
        match region {
            Region::Local => self.masking_national_charge,
            Region::International => self.masking_international_charge,
        }
    }
}

/// Per-operator charge of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PrefixCharge {
    pub package_id: String,
    /// One of [`OPERATOR_PREFIXES`].
    pub prefix: String,
    pub masking_charge: Money,
    pub non_masking_charge: Money,
}

impl PrefixCharge {
    /// Charge row matching the receiver's operator, if any.
    pub fn lookup<'a>(charges: &'a [PrefixCharge], phone: &str) -> Option<&'a PrefixCharge> {
        let prefix = operator_prefix(phone)?;
        charges.iter().find(|c| c.prefix == prefix)
    }
}

/// Operator prefix (`013`..`019`) of a local number, with or without the
/// `+88`/`88` country code.
pub fn operator_prefix(phone: &str) -> Option<&'static str> {
    let phone = phone.trim();
    let phone = phone.strip_prefix('+').unwrap_or(phone);
    let local = phone.strip_prefix("88").unwrap_or(phone);
    OPERATOR_PREFIXES
        .iter()
        .copied()
        .find(|prefix| local.starts_with(prefix))
}

// =============================================================================
// Accounts
// =============================================================================

/// A panel user with billing configuration and wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SmsUser {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    /// Reseller (for clients) or admin (for resellers).
    pub owner_user_id: Option<String>,
    pub package_id: Option<String>,
    pub region_type: Option<Region>,
    pub balance_valid_till: Option<NaiveDate>,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub wallet: Wallet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Billing configuration a client needs before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingTarget<'a> {
    pub owner_user_id: &'a str,
    pub package_id: &'a str,
    pub region: Region,
}

impl SmsUser {
    /// Reseller, package and region, or the first one that is missing.
    pub fn billing(&self) -> CoreResult<BillingTarget<'_>> {
        let missing = |what: &str| CoreError::AccountNotConfigured(format!("{} has no {}", self.username, what));
        Ok(BillingTarget {
            owner_user_id: self.owner_user_id.as_deref().ok_or_else(|| missing("reseller"))?,
            package_id: self.package_id.as_deref().ok_or_else(|| missing("package"))?,
            region: self.region_type.ok_or_else(|| missing("region"))?,
        })
    }
}

/// Refuses clients whose balance validity date is in the past.
pub fn check_validity(valid_till: Option<NaiveDate>, today: NaiveDate) -> CoreResult<()> {
    match valid_till {
        Some(date) if date < today => Err(CoreError::BalanceExpired(date.to_string())),
        _ => Ok(()),
    }
}

// =============================================================================
// Deduction and Refund
// =============================================================================

/// The slot and amount a send is billed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub slot: Slot,
    /// Minor units for money slots, parts for quota slots.
    pub units: i64,
    /// Message parts the charge covers.
    pub parts: i64,
}

impl Charge {
    /// Bills `parts` message parts under `package` for a client in `region`.
    pub fn for_parts(package: &Package, region: Region, parts: i64) -> CoreResult<Self> {
        if package.prefix_based {
            let cost = package
                .non_masking_charge(region)
                .checked_times(parts)
                .ok_or_else(|| ValidationError::TooLarge {
                    field: "charge".to_string(),
                })?;
            Ok(Charge {
                slot: Slot::new(region, false, SlotKind::Balance),
                units: cost.minor(),
                parts,
            })
        } else {
            Ok(Charge {
                slot: Slot::new(region, false, SlotKind::Messages),
                units: parts,
                parts,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionOutcome {
    pub client: Wallet,
    pub reseller: Wallet,
    pub low_balance: bool,
    pub charge: Charge,
}

/// Deducts a send from both the client's and the reseller's wallet.
///
/// When either wallet holds no more than the cost, both are returned
/// unchanged and `low_balance` is set.
pub fn deduct(
    client: &Wallet,
    reseller: &Wallet,
    package: &Package,
    region: Region,
    parts: i64,
) -> CoreResult<DeductionOutcome> {
    let charge = Charge::for_parts(package, region, parts)?;
    let low_balance = is_low(client, reseller, &charge);

    if low_balance {
        return Ok(DeductionOutcome {
            client: *client,
            reseller: *reseller,
            low_balance,
            charge,
        });
    }

    Ok(DeductionOutcome {
        client: client.adjusted(charge.slot, -charge.units),
        reseller: reseller.adjusted(charge.slot, -charge.units),
        low_balance,
        charge,
    })
}

/// Either wallet cannot cover the charge.
pub fn is_low(client: &Wallet, reseller: &Wallet, charge: &Charge) -> bool {
    client.get(charge.slot) <= charge.units || reseller.get(charge.slot) <= charge.units
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundOutcome {
    pub client: Wallet,
    pub reseller: Wallet,
    pub charge: Charge,
}

/// Returns the cost of `parts` undelivered parts to both wallets.
pub fn refund(
    client: &Wallet,
    reseller: &Wallet,
    package: &Package,
    region: Region,
    parts: i64,
) -> CoreResult<RefundOutcome> {
    let charge = Charge::for_parts(package, region, parts)?;
    Ok(RefundOutcome {
        client: client.adjusted(charge.slot, charge.units),
        reseller: reseller.adjusted(charge.slot, charge.units),
        charge,
    })
}

/// Checks that a reseller can fund a recharge out of their own wallet.
pub fn check_recharge(reseller: &Wallet, slot: Slot, units: i64) -> CoreResult<()> {
    if units <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        }
        .into());
    }
    let available = reseller.get(slot);
    if available < units {
        return Err(CoreError::InsufficientBalance {
            slot: slot.to_string(),
            available,
            requested: units,
        });
    }
    Ok(())
}

// =============================================================================
// Logs
// =============================================================================

/// Audit row written for every deduction and refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BalanceLog {
    pub id: String,
    pub sender_id: String,
    /// Client's charged slot before the operation.
    pub current_balance: i64,
    pub after_operation_balance: i64,
    pub number_of_sms_count: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl BalanceLog {
    /// Builds the log for a charge applied to `client` (the wallet before
    /// the change). `increase` selects the refund direction.
    pub fn for_charge(sender_id: &str, client: &Wallet, charge: &Charge, increase: bool) -> Self {
        let current = client.get(charge.slot);
        let (after, note) = if increase {
            (current + charge.units, NOTE_INCREASE)
        } else {
            (current - charge.units, NOTE_DECREASE)
        };
        BalanceLog {
            id: crate::types::new_id(),
            sender_id: sender_id.to_string(),
            current_balance: current,
            after_operation_balance: after,
            number_of_sms_count: charge.parts,
            note: note.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Direction of a recharge transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum TransactionType {
    Debit,
    Credit,
}

/// Recharge history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Transaction {
    pub id: String,
    pub recharged_to: String,
    pub recharged_by: String,
    pub balance: Money,
    pub message_amount: Option<i64>,
    pub transaction_type: TransactionType,
    /// Wallet column credited.
    pub balance_type: String,
    pub region_type: Region,
    pub balance_valid_till: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(prefix_based: bool) -> Package {
        Package {
            id: "pkg".into(),
            name: "Basic".into(),
            owner_user_id: None,
            bill_type: BillType::Prepaid,
            is_deletable: true,
            masking_national_charge: Money::from_minor(50),
            non_masking_national_charge: Money::from_minor(35),
            masking_international_charge: Money::from_minor(500),
            non_masking_international_charge: Money::from_minor(250),
            prefix_based,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn quota(n: i64) -> Wallet {
        Wallet {
            local_non_masking_message_amount: n,
            ..Wallet::default()
        }
    }

    #[test]
    fn test_quota_deduction() {
        let out = deduct(&quota(100), &quota(1000), &package(false), Region::Local, 10).unwrap();
        assert!(!out.low_balance);
        assert_eq!(out.client.local_non_masking_message_amount, 90);
        assert_eq!(out.reseller.local_non_masking_message_amount, 990);
        assert_eq!(out.charge.units, 10);
    }

    #[test]
    fn test_equal_balance_is_low() {
        let out = deduct(&quota(10), &quota(1000), &package(false), Region::Local, 10).unwrap();
        assert!(out.low_balance);
        assert_eq!(out.client, quota(10));
        assert_eq!(out.reseller, quota(1000));
    }

    #[test]
    fn test_low_reseller_blocks_client() {
        let out = deduct(&quota(100), &quota(5), &package(false), Region::Local, 10).unwrap();
        assert!(out.low_balance);
        assert_eq!(out.client.local_non_masking_message_amount, 100);
    }

    #[test]
    fn test_prefix_based_charges_money() {
        let client = Wallet {
            international_non_masking_balance: Money::from_major(10),
            ..Wallet::default()
        };
        let reseller = Wallet {
            international_non_masking_balance: Money::from_major(100),
            ..Wallet::default()
        };
        let out = deduct(&client, &reseller, &package(true), Region::International, 3).unwrap();
        assert!(!out.low_balance);
        assert_eq!(out.charge.units, 750);
        assert_eq!(out.client.international_non_masking_balance.minor(), 250);
        assert_eq!(out.reseller.international_non_masking_balance.minor(), 9250);
        // quota untouched
        assert_eq!(out.client.international_non_masking_message_amount, 0);
    }

    #[test]
    fn test_refund_restores_deduction() {
        let pkg = package(false);
        let out = deduct(&quota(50), &quota(500), &pkg, Region::Local, 7).unwrap();
        let back = refund(&out.client, &out.reseller, &pkg, Region::Local, 7).unwrap();
        assert_eq!(back.client, quota(50));
        assert_eq!(back.reseller, quota(500));
    }

    #[test]
    fn test_oversized_money_charge_is_rejected() {
        let err = deduct(&quota(0), &quota(0), &package(true), Region::Local, i64::MAX / 2).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::TooLarge { .. })));
    }

    #[test]
    fn test_balance_log() {
        let charge = Charge::for_parts(&package(false), Region::Local, 4).unwrap();
        let log = BalanceLog::for_charge("u1", &quota(20), &charge, false);
        assert_eq!(log.current_balance, 20);
        assert_eq!(log.after_operation_balance, 16);
        assert_eq!(log.note, NOTE_DECREASE);

        let log = BalanceLog::for_charge("u1", &quota(16), &charge, true);
        assert_eq!(log.after_operation_balance, 20);
        assert_eq!(log.note, NOTE_INCREASE);
    }

    #[test]
    fn test_validity() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert!(check_validity(None, today).is_ok());
        assert!(check_validity(Some(today), today).is_ok());
        assert!(matches!(
            check_validity(NaiveDate::from_ymd_opt(2024, 6, 9), today),
            Err(CoreError::BalanceExpired(_))
        ));
    }

    #[test]
    fn test_recharge_check() {
        let slot = Slot::new(Region::Local, false, SlotKind::Messages);
        assert!(check_recharge(&quota(100), slot, 100).is_ok());
        assert!(check_recharge(&quota(100), slot, 101).is_err());
        assert!(check_recharge(&quota(100), slot, 0).is_err());
    }

    #[test]
    fn test_slot_columns_round_trip_through_wallet() {
        let slot = Slot::new(Region::International, true, SlotKind::Balance);
        let wallet = Wallet::default().adjusted(slot, 1234);
        assert_eq!(wallet.international_masking_balance.minor(), 1234);
        assert_eq!(wallet.get(slot), 1234);
        assert_eq!(slot.column(), "international_masking_balance");
    }

    #[test]
    fn test_operator_prefix() {
        assert_eq!(operator_prefix("01712345678"), Some("017"));
        assert_eq!(operator_prefix("+8801912345678"), Some("019"));
        assert_eq!(operator_prefix("8801312345678"), Some("013"));
        assert_eq!(operator_prefix("0121234567"), None);

        let charges = vec![PrefixCharge {
            package_id: "pkg".into(),
            prefix: "017".into(),
            masking_charge: Money::from_minor(60),
            non_masking_charge: Money::from_minor(30),
        }];
        assert_eq!(
            PrefixCharge::lookup(&charges, "01700000000").map(|c| c.non_masking_charge.minor()),
            Some(30)
        );
        assert!(PrefixCharge::lookup(&charges, "01800000000").is_none());
    }

    #[test]
    fn test_billing_requires_configuration() {
        let mut user = SmsUser {
            id: "c1".into(),
            username: "client".into(),
            role: UserRole::Client,
            owner_user_id: Some("r1".into()),
            package_id: None,
            region_type: Some(Region::Local),
            balance_valid_till: None,
            wallet: Wallet::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(user.billing(), Err(CoreError::AccountNotConfigured(_))));

        user.package_id = Some("pkg".into());
        let target = user.billing().unwrap();
        assert_eq!(target.owner_user_id, "r1");
        assert_eq!(target.region, Region::Local);
    }
}
