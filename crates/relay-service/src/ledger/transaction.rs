//! Badge issuance transaction
//!
//! One Core `CreateV1` instruction per transaction. The asset gets a
//! `PermanentFreezeDelegate { frozen: true }` plugin with no plugin
//! authority, which makes it non-transferable for good.

use borsh::{BorshDeserialize, BorshSerialize};
use repute_common::Credential;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;

use super::{LedgerError, SignedIssuance};
use crate::relayer::RelayerAuthority;

/// Core asset program (CoREENxT6tW1HoK8ypY1SxRMZTcVPm7R94rH4PZNhX7d)
pub const CORE_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    175, 84, 171, 16, 189, 151, 165, 66, 160, 158, 247, 179, 152, 137, 221, 12, 211, 148, 164,
    204, 233, 223, 166, 205, 201, 126, 190, 45, 35, 91, 167, 72,
]);

/// Account discriminator byte of a Core asset account
pub const ASSET_V1_KEY: u8 = 1;

const CREATE_V1_DISCRIMINATOR: u8 = 0;
const PLUGIN_PERMANENT_FREEZE_DELEGATE: u8 = 5;

#[derive(BorshSerialize)]
enum DataState {
    AccountState,
}

#[derive(BorshSerialize)]
enum PluginAuthority {
    None,
}

/// `Plugin::PermanentFreezeDelegate { frozen }`, the only plugin attached
#[derive(BorshSerialize)]
struct FreezePlugin {
    variant: u8,
    frozen: bool,
}

#[derive(BorshSerialize)]
struct PluginAuthorityPair {
    plugin: FreezePlugin,
    authority: Option<PluginAuthority>,
}

#[derive(BorshSerialize)]
struct CreateV1Args {
    data_state: DataState,
    name: String,
    uri: String,
    plugins: Option<Vec<PluginAuthorityPair>>,
}

#[allow(dead_code)]
#[derive(BorshDeserialize)]
enum UpdateAuthority {
    None,
    Address([u8; 32]),
    Collection([u8; 32]),
}

/// Leading fields of a Core asset account
#[derive(BorshDeserialize)]
struct AssetHeader {
    key: u8,
    owner: [u8; 32],
    _update_authority: UpdateAuthority,
    name: String,
    uri: String,
}

/// `CreateV1` for a new asset owned by `owner`, paid for by `payer`
pub fn create_badge_instruction(
    asset: &Pubkey,
    payer: &Pubkey,
    owner: &Pubkey,
    badge_name: &str,
    metadata_uri: &str,
) -> Result<Instruction, LedgerError> {
    let args = CreateV1Args {
        data_state: DataState::AccountState,
        name: badge_name.to_string(),
        uri: metadata_uri.to_string(),
        plugins: Some(vec![PluginAuthorityPair {
            plugin: FreezePlugin {
                variant: PLUGIN_PERMANENT_FREEZE_DELEGATE,
                frozen: true,
            },
            authority: Some(PluginAuthority::None),
        }]),
    };

    let mut data = vec![CREATE_V1_DISCRIMINATOR];
    data.extend(
        args.try_to_vec()
            .map_err(|e| LedgerError::Encode(e.to_string()))?,
    );

    // Absent optional accounts are passed as the program id
    Ok(Instruction {
        program_id: CORE_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*asset, true),
            AccountMeta::new_readonly(CORE_PROGRAM_ID, false), // collection
            AccountMeta::new_readonly(CORE_PROGRAM_ID, false), // authority
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(CORE_PROGRAM_ID, false), // update authority
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(CORE_PROGRAM_ID, false), // log wrapper
        ],
        data,
    })
}

/// Build and sign the issuance of one badge to `owner`
///
/// `asset` is a freshly generated keypair; its public key becomes the
/// credential id. The relayer pays fees and signs first, so its signature
/// is the transaction reference.
pub fn build_issuance(
    relayer: &RelayerAuthority,
    asset: &Keypair,
    owner: &Pubkey,
    badge_name: &str,
    metadata_uri: &str,
    recent_blockhash: Hash,
) -> Result<SignedIssuance, LedgerError> {
    let payer = relayer.keypair();
    let instruction = create_badge_instruction(
        &asset.pubkey(),
        &payer.pubkey(),
        owner,
        badge_name,
        metadata_uri,
    )?;

    let mut transaction = Transaction::new_with_payer(&[instruction], Some(&payer.pubkey()));
    transaction.try_sign(&[payer, asset], recent_blockhash)?;

    let tx_ref = transaction
        .signatures
        .first()
        .copied()
        .ok_or_else(|| LedgerError::Encode("transaction has no signatures".to_string()))?;

    Ok(SignedIssuance {
        tx_ref,
        credential: Credential {
            id: asset.pubkey(),
            owner: *owner,
            badge_name: badge_name.to_string(),
            metadata_uri: metadata_uri.to_string(),
        },
        transaction,
    })
}

/// Decode a Core asset account into a credential
///
/// Returns `None` for anything that is not an asset account.
pub fn decode_asset_account(id: Pubkey, data: &[u8]) -> Option<Credential> {
    let header = AssetHeader::deserialize(&mut &data[..]).ok()?;
    if header.key != ASSET_V1_KEY {
        return None;
    }

    Some(Credential {
        id,
        owner: Pubkey::new_from_array(header.owner),
        badge_name: header.name,
        metadata_uri: header.uri,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serialize an asset account the way the Core program lays it out
    pub(crate) fn encode_asset_account(owner: &Pubkey, name: &str, uri: &str) -> Vec<u8> {
        let mut data = vec![ASSET_V1_KEY];
        data.extend_from_slice(&owner.to_bytes());
        data.push(1); // UpdateAuthority::Address
        data.extend_from_slice(&[9u8; 32]);
        data.extend_from_slice(&(name.len() as u32).to_le_bytes());
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&(uri.len() as u32).to_le_bytes());
        data.extend_from_slice(uri.as_bytes());
        data.push(0); // seq: None
        data
    }

    #[test]
    fn test_program_id() {
        assert_eq!(
            CORE_PROGRAM_ID.to_string(),
            "CoREENxT6tW1HoK8ypY1SxRMZTcVPm7R94rH4PZNhX7d"
        );
    }

    #[test]
    fn test_issuance_is_signed_by_payer_and_asset() {
        let relayer = RelayerAuthority::generate();
        let asset = Keypair::new();
        let owner = Pubkey::new_unique();
        let blockhash = Hash::new_unique();

        let issuance = build_issuance(
            &relayer,
            &asset,
            &owner,
            "Repute: Power User",
            "https://x/m.json",
            blockhash,
        )
        .unwrap();

        let tx = &issuance.transaction;
        assert!(tx.verify().is_ok());
        assert_eq!(tx.message.recent_blockhash, blockhash);
        assert_eq!(tx.message.header.num_required_signatures, 2);
        assert_eq!(tx.message.account_keys[0], relayer.address());
        assert_eq!(tx.message.account_keys[1], asset.pubkey());
        assert_eq!(issuance.tx_ref, tx.signatures[0]);

        assert_eq!(issuance.credential.owner, owner);
        assert_eq!(issuance.credential.id, asset.pubkey());
    }

    #[test]
    fn test_instruction_accounts() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let owner = Pubkey::new_unique();

        let ix = create_badge_instruction(&asset, &payer, &owner, "B", "u").unwrap();

        assert_eq!(ix.program_id, CORE_PROGRAM_ID);
        assert_eq!(ix.accounts.len(), 8);
        assert_eq!(ix.accounts[0], AccountMeta::new(asset, true));
        assert_eq!(ix.accounts[3], AccountMeta::new(payer, true));
        assert_eq!(ix.accounts[4], AccountMeta::new_readonly(owner, false));
        assert_eq!(ix.accounts[6].pubkey, system_program::ID);
    }

    #[test]
    fn test_instruction_data_carries_freeze_plugin() {
        let ix = create_badge_instruction(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            "B",
            "u",
        )
        .unwrap();

        // discriminator, data_state, name, uri, Some([pair])
        let expected_data: Vec<u8> = [
            vec![0u8, 0u8],
            vec![1, 0, 0, 0, b'B'],
            vec![1, 0, 0, 0, b'u'],
            vec![1, 1, 0, 0, 0, PLUGIN_PERMANENT_FREEZE_DELEGATE, 1, 1, 0],
        ]
        .concat();
        assert_eq!(ix.data, expected_data);
    }

    #[test]
    fn test_owner_equal_to_payer_is_deduplicated() {
        let relayer = RelayerAuthority::generate();
        let asset = Keypair::new();
        let owner = relayer.address();

        let issuance =
            build_issuance(&relayer, &asset, &owner, "B", "u", Hash::new_unique()).unwrap();

        let keys = &issuance.transaction.message.account_keys;
        assert_eq!(keys.iter().filter(|k| **k == owner).count(), 1);
        assert!(issuance.transaction.verify().is_ok());
    }

    #[test]
    fn test_decode_asset_account() {
        let owner = Pubkey::new_unique();
        let id = Pubkey::new_unique();
        let data = encode_asset_account(&owner, "Repute: Power User", "https://x/m.json");

        let credential = decode_asset_account(id, &data).unwrap();
        assert_eq!(credential.owner, owner);
        assert_eq!(credential.id, id);
        assert_eq!(credential.badge_name, "Repute: Power User");
        assert_eq!(credential.metadata_uri, "https://x/m.json");

        let mut not_asset = data.clone();
        not_asset[0] = 2;
        assert!(decode_asset_account(id, &not_asset).is_none());
        assert!(decode_asset_account(id, &data[..10]).is_none());
    }
}
