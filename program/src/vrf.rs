// VRF oracle integration: randomness request CPI and winner selection
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    instruction::{AccountMeta, Instruction},
    msg,
    program::invoke_signed,
    program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::raffle_state::IDENTITY_SEED;

/// Prefix of the oracle program's request-randomness instruction
pub const REQUEST_RANDOMNESS_DISCRIMINATOR: [u8; 8] = [3, 0, 0, 0, 0, 0, 0, 0];

/// Account the oracle must pass to the callback instruction
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallbackAccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl From<&CallbackAccountMeta> for AccountMeta {
    fn from(meta: &CallbackAccountMeta) -> Self {
        AccountMeta {
            pubkey: meta.pubkey,
            is_signer: meta.is_signer,
            is_writable: meta.is_writable,
        }
    }
}

/// Randomness request sent to the oracle program.
///
/// The oracle answers by invoking `callback_program_id` with
/// `callback_discriminator ++ randomness ++ callback_args`, its own identity as
/// the first (signer) account, followed by `callback_accounts`.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct VrfRequest {
    /// Binds the request to its caller; the oracle mixes it into the VRF input
    pub caller_seed: [u8; 32],
    pub callback_program_id: Pubkey,
    pub callback_discriminator: Vec<u8>,
    pub callback_accounts: Vec<CallbackAccountMeta>,
    pub callback_args: Vec<u8>,
}

impl VrfRequest {
    pub fn pack(&self) -> Result<Vec<u8>, ProgramError> {
        let mut data = REQUEST_RANDOMNESS_DISCRIMINATOR.to_vec();
        self.serialize(&mut data)
            .map_err(|_| ProgramError::InvalidInstructionData)?;
        Ok(data)
    }

    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let rest = input
            .strip_prefix(&REQUEST_RANDOMNESS_DISCRIMINATOR[..])
            .ok_or(ProgramError::InvalidInstructionData)?;
        Self::try_from_slice(rest).map_err(|_| ProgramError::InvalidInstructionData)
    }
}

/// Accounts of the randomness request CPI
pub struct RequestAccounts<'a, 'info> {
    pub payer: &'a AccountInfo<'info>,
    pub program_identity: &'a AccountInfo<'info>,
    pub oracle_queue: &'a AccountInfo<'info>,
    pub vrf_program: &'a AccountInfo<'info>,
    pub slot_hashes: &'a AccountInfo<'info>,
    pub system_program: &'a AccountInfo<'info>,
}

/// Sends `request` to the oracle program, signed by the program identity PDA.
pub fn request_randomness(
    accounts: RequestAccounts,
    request: &VrfRequest,
    identity_bump: u8,
) -> ProgramResult {
    if !accounts.payer.is_signer {
        msg!("Payer account must be a signer");
        return Err(ProgramError::MissingRequiredSignature);
    }

    let instruction = Instruction {
        program_id: *accounts.vrf_program.key,
        accounts: vec![
            AccountMeta::new(*accounts.payer.key, true),
            AccountMeta::new_readonly(*accounts.program_identity.key, true),
            AccountMeta::new(*accounts.oracle_queue.key, false),
            AccountMeta::new_readonly(*accounts.system_program.key, false),
            AccountMeta::new_readonly(*accounts.slot_hashes.key, false),
        ],
        data: request.pack()?,
    };

    invoke_signed(
        &instruction,
        &[
            accounts.payer.clone(),
            accounts.program_identity.clone(),
            accounts.oracle_queue.clone(),
            accounts.system_program.clone(),
            accounts.slot_hashes.clone(),
            accounts.vrf_program.clone(),
        ],
        &[&[IDENTITY_SEED, &[identity_bump]]],
    )?;

    msg!("VRF randomness request submitted to queue {}", accounts.oracle_queue.key);
    Ok(())
}

/// Picks a winner among `entrant_count` tickets.
///
/// The 32 random bytes are read as one little-endian 256-bit integer and
/// reduced modulo `entrant_count`. Plain modulo favours the lowest
/// `2^256 mod n` indices by one extra preimage each, a relative bias below
/// `n / 2^256`, which is negligible for any ticket count a raffle can hold.
pub fn winner_index(randomness: &[u8; 32], entrant_count: u32) -> Option<u32> {
    if entrant_count == 0 {
        return None;
    }
    let modulus = entrant_count as u64;
    let remainder = randomness
        .iter()
        .rev()
        .fold(0u64, |acc, byte| ((acc << 8) | *byte as u64) % modulus);
    Some(remainder as u32)
}

/// Hex rendering of the randomness for program logs
pub fn randomness_hex(randomness: &[u8; 32]) -> String {
    randomness.iter().map(|byte| format!("{:02x}", byte)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winner_index_matches_wide_modulo() {
        let mut randomness = [0u8; 32];
        for (i, byte) in randomness.iter_mut().take(16).enumerate() {
            *byte = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&randomness[..16]);
        let value = u128::from_le_bytes(low);

        for count in [1u32, 2, 3, 7, 10, 318, 65_537, u32::MAX] {
            assert_eq!(
                winner_index(&randomness, count),
                Some((value % count as u128) as u32)
            );
        }
    }

    #[test]
    fn winner_index_uses_high_bytes() {
        // 2^248 mod 3 == 1, so a lone top byte of 1 selects index 1
        let mut randomness = [0u8; 32];
        randomness[31] = 1;
        assert_eq!(winner_index(&randomness, 3), Some(1));
        assert_eq!(winner_index(&randomness, 2), Some(0));
    }

    #[test]
    fn winner_index_is_always_in_range() {
        let randomness = [0xffu8; 32];
        for count in 1..200u32 {
            let index = winner_index(&randomness, count).unwrap();
            assert!(index < count);
        }
        assert_eq!(winner_index(&randomness, 0), None);
    }

    #[test]
    fn request_codec() {
        let request = VrfRequest {
            caller_seed: Pubkey::new_unique().to_bytes(),
            callback_program_id: Pubkey::new_unique(),
            callback_discriminator: vec![5],
            callback_accounts: vec![CallbackAccountMeta {
                pubkey: Pubkey::new_unique(),
                is_signer: false,
                is_writable: true,
            }],
            callback_args: vec![],
        };
        let data = request.pack().unwrap();

        assert_eq!(&data[..8], &REQUEST_RANDOMNESS_DISCRIMINATOR);
        assert_eq!(&data[8..40], &request.caller_seed);
        assert_eq!(VrfRequest::unpack(&data).unwrap(), request);
        assert!(VrfRequest::unpack(&data[1..]).is_err());
    }

    #[test]
    fn hex_rendering() {
        let mut randomness = [0u8; 32];
        randomness[0] = 0xab;
        randomness[31] = 0x01;
        let hex = randomness_hex(&randomness);
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("ab00"));
        assert!(hex.ends_with("0001"));
    }
}
