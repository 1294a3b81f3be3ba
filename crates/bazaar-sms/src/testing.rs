//! Shared fixtures for the engine's unit tests.

use bazaar_core::sms::balance::{BillType, Region, Slot, SlotKind, UserRole};
use bazaar_core::Money;
use bazaar_db::repository::{NewPackage, NewSmsApi, NewSmsUser, Recharge};
use bazaar_db::{Database, DbConfig};

use crate::config::DispatchSettings;

pub(crate) const QUOTA: Slot = Slot::new(Region::Local, false, SlotKind::Messages);

pub(crate) struct Accounts {
    pub db: Database,
    pub reseller: String,
    pub client: String,
    /// Gateway ids in priority order.
    pub gateways: Vec<String>,
}

pub(crate) fn gateway_url(host: &str) -> String {
    format!("http://{}/send?to={{phone_number}}&msg={{message}}", host)
}

/// A reseller with 1000 quota parts, a client holding `client_parts` of
/// them, and one elitbuzz gateway per host assigned in the given order.
pub(crate) async fn accounts(hosts: &[&str], client_parts: i64) -> Accounts {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let sms = db.sms();

    let reseller = sms
        .create_user(&NewSmsUser {
            username: "reseller".into(),
            role: UserRole::Reseller,
            owner_user_id: None,
            package_id: None,
            region_type: None,
            balance_valid_till: None,
        })
        .await
        .unwrap();
    let package = sms
        .create_package(&NewPackage {
            name: "Standard".into(),
            owner_user_id: Some(reseller.id.clone()),
            bill_type: BillType::default(),
            non_masking_national_charge: Money::from_minor(35),
            ..NewPackage::default()
        })
        .await
        .unwrap();
    let client = sms
        .create_user(&NewSmsUser {
            username: "client".into(),
            role: UserRole::Client,
            owner_user_id: Some(reseller.id.clone()),
            package_id: Some(package.id),
            region_type: Some(Region::Local),
            balance_valid_till: None,
        })
        .await
        .unwrap();

    let mut gateways = Vec::new();
    for (idx, host) in hosts.iter().enumerate() {
        let api = sms
            .create_api(&NewSmsApi {
                name: format!("Gateway {}", host),
                vendor_name: Some("elitbuzz".into()),
                url: gateway_url(host),
                priority: idx as i64 + 1,
                is_deletable: true,
            })
            .await
            .unwrap();
        sms.assign_api(&reseller.id, &api.id, idx as i64 + 1, false, 0)
            .await
            .unwrap();
        gateways.push(api.id);
    }

    sms.top_up(&reseller.id, QUOTA, 1_000).await.unwrap();
    if client_parts > 0 {
        sms.recharge(&Recharge {
            recharged_to: client.id.clone(),
            recharged_by: reseller.id.clone(),
            slot: QUOTA,
            units: client_parts,
            balance_valid_till: None,
            remarks: None,
        })
        .await
        .unwrap();
    }

    Accounts {
        db,
        reseller: reseller.id,
        client: client.id,
        gateways,
    }
}

/// No waiting between attempts.
pub(crate) fn fast_dispatch(max_retries: u32) -> DispatchSettings {
    DispatchSettings {
        max_retries,
        retry_base_delay_secs: 0,
        reconcile_delay_secs: 0,
        ..DispatchSettings::default()
    }
}
