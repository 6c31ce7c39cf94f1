use solana_program::{
    clock::UnixTimestamp,
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
    sysvar::slot_hashes,
};
use std::convert::TryInto;
use std::mem::size_of;

use crate::{
    raffle_error::RaffleError,
    raffle_state::RaffleTerms,
    utils::{find_config_address, find_program_identity_address, find_raffle_address},
};

/// Tag of the oracle callback instruction, handed to the oracle in every request
pub const DRAW_CALLBACK_TAG: u8 = 5;

#[derive(Clone, Debug, PartialEq)]
pub enum RaffleInstruction {
    /// Initialize the program config. The signer becomes the admin.
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The admin account, pays for the config account
    /// 1. `[writable]` The config account (PDA)
    /// 2. `[]` The system program
    InitializeConfig {
        /// Program that serves randomness requests
        vrf_program: Pubkey,
        /// Oracle queue randomness requests must target
        oracle_queue: Pubkey,
        /// Identity the oracle signs callbacks with
        vrf_program_identity: Pubkey,
        /// Minimum ticket price in lamports
        min_ticket_price: u64,
        /// Maximum raffle duration in seconds
        max_duration: i64,
    },

    /// Update admin address (admin only)
    ///
    /// Accounts expected:
    /// 0. `[signer]` Current admin authority
    /// 1. `[]` New admin address
    /// 2. `[writable]` Config account
    UpdateAdmin {},

    /// Create a raffle at the PDA derived from its terms
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The raffle manager, pays the account rent
    /// 1. `[writable]` The raffle account (PDA)
    /// 2. `[]` Config account
    /// 3. `[]` The system program
    CreateRaffle {
        /// Price per ticket in lamports
        ticket_price: u64,
        /// Maximum number of tickets
        max_tickets: u32,
        /// Unix timestamp after which no tickets can be bought
        end_time: UnixTimestamp,
    },

    /// Purchase tickets for a raffle
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The ticket buyer
    /// 1. `[writable]` The raffle account
    /// 2. `[]` The system program
    BuyTickets {
        /// Number of tickets to purchase
        quantity: u32,
    },

    /// Request randomness for a raffle that is sold out or past its end time
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` Any user, pays the oracle fee
    /// 1. `[writable]` The raffle account
    /// 2. `[]` Config account
    /// 3. `[]` Program identity PDA
    /// 4. `[writable]` Oracle queue
    /// 5. `[]` VRF program
    /// 6. `[]` Slot hashes sysvar
    /// 7. `[]` The system program
    RequestDraw {},

    /// Oracle callback carrying the randomness
    ///
    /// Accounts expected:
    /// 0. `[signer]` Oracle identity
    /// 1. `[writable]` The raffle account
    /// 2. `[]` Config account
    DrawCallback {
        randomness: [u8; 32],
    },

    /// Pay the prize to the drawn winner. Anyone can submit it.
    ///
    /// Accounts expected:
    /// 0. `[signer]` Any user
    /// 1. `[writable]` The raffle account
    /// 2. `[writable]` The winner
    ClaimPrize {},

    /// Close a claimed or empty raffle and refund its rent to the manager
    ///
    /// Accounts expected:
    /// 0. `[signer]` Raffle manager or program admin
    /// 1. `[writable]` The raffle account
    /// 2. `[writable]` The raffle manager
    /// 3. `[]` Config account
    CloseRaffle {},
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (tag, rest) = input
            .split_first()
            .ok_or(RaffleError::InvalidInstructionData)?;

        Ok(match *tag {
            0 => {
                let (vrf_program, rest) = Self::unpack_pubkey(rest)?;
                let (oracle_queue, rest) = Self::unpack_pubkey(rest)?;
                let (vrf_program_identity, rest) = Self::unpack_pubkey(rest)?;
                let (min_ticket_price, rest) = Self::unpack_u64(rest)?;
                let (max_duration, _) = Self::unpack_i64(rest)?;
                Self::InitializeConfig {
                    vrf_program,
                    oracle_queue,
                    vrf_program_identity,
                    min_ticket_price,
                    max_duration,
                }
            }
            1 => Self::UpdateAdmin {},
            2 => {
                let (ticket_price, rest) = Self::unpack_u64(rest)?;
                let (max_tickets, rest) = Self::unpack_u32(rest)?;
                let (end_time, _) = Self::unpack_i64(rest)?;
                Self::CreateRaffle {
                    ticket_price,
                    max_tickets,
                    end_time,
                }
            }
            3 => {
                let (quantity, _) = Self::unpack_u32(rest)?;
                Self::BuyTickets { quantity }
            }
            4 => Self::RequestDraw {},
            DRAW_CALLBACK_TAG => {
                let (randomness, _) = Self::unpack_fixed_bytes::<32>(rest)?;
                Self::DrawCallback { randomness }
            }
            6 => Self::ClaimPrize {},
            7 => Self::CloseRaffle {},
            _ => return Err(RaffleError::InvalidInstructionData.into()),
        })
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(size_of::<Self>());
        match *self {
            Self::InitializeConfig {
                ref vrf_program,
                ref oracle_queue,
                ref vrf_program_identity,
                min_ticket_price,
                max_duration,
            } => {
                buf.push(0);
                buf.extend_from_slice(vrf_program.as_ref());
                buf.extend_from_slice(oracle_queue.as_ref());
                buf.extend_from_slice(vrf_program_identity.as_ref());
                buf.extend_from_slice(&min_ticket_price.to_le_bytes());
                buf.extend_from_slice(&max_duration.to_le_bytes());
            }
            Self::UpdateAdmin {} => buf.push(1),
            Self::CreateRaffle {
                ticket_price,
                max_tickets,
                end_time,
            } => {
                buf.push(2);
                buf.extend_from_slice(&ticket_price.to_le_bytes());
                buf.extend_from_slice(&max_tickets.to_le_bytes());
                buf.extend_from_slice(&end_time.to_le_bytes());
            }
            Self::BuyTickets { quantity } => {
                buf.push(3);
                buf.extend_from_slice(&quantity.to_le_bytes());
            }
            Self::RequestDraw {} => buf.push(4),
            Self::DrawCallback { ref randomness } => {
                buf.push(DRAW_CALLBACK_TAG);
                buf.extend_from_slice(randomness);
            }
            Self::ClaimPrize {} => buf.push(6),
            Self::CloseRaffle {} => buf.push(7),
        }
        buf
    }

    fn unpack_fixed_bytes<const N: usize>(input: &[u8]) -> Result<([u8; N], &[u8]), ProgramError> {
        if input.len() < N {
            return Err(RaffleError::InvalidInstructionData.into());
        }
        let (bytes, rest) = input.split_at(N);
        let bytes = bytes
            .try_into()
            .map_err(|_| RaffleError::InvalidInstructionData)?;
        Ok((bytes, rest))
    }

    fn unpack_pubkey(input: &[u8]) -> Result<(Pubkey, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<32>(input)?;
        Ok((Pubkey::new_from_array(bytes), rest))
    }

    fn unpack_u64(input: &[u8]) -> Result<(u64, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<8>(input)?;
        Ok((u64::from_le_bytes(bytes), rest))
    }

    fn unpack_i64(input: &[u8]) -> Result<(i64, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<8>(input)?;
        Ok((i64::from_le_bytes(bytes), rest))
    }

    fn unpack_u32(input: &[u8]) -> Result<(u32, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<4>(input)?;
        Ok((u32::from_le_bytes(bytes), rest))
    }
}

/// Create initialize_config instruction
pub fn initialize_config(
    program_id: &Pubkey,
    admin: &Pubkey,
    vrf_program: &Pubkey,
    oracle_queue: &Pubkey,
    vrf_program_identity: &Pubkey,
    min_ticket_price: u64,
    max_duration: i64,
) -> Instruction {
    let data = RaffleInstruction::InitializeConfig {
        vrf_program: *vrf_program,
        oracle_queue: *oracle_queue,
        vrf_program_identity: *vrf_program_identity,
        min_ticket_price,
        max_duration,
    }
    .pack();
    let (config_account, _) = find_config_address(program_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*admin, true),
            AccountMeta::new(config_account, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    }
}

/// Create update_admin instruction
pub fn update_admin(program_id: &Pubkey, current_admin: &Pubkey, new_admin: &Pubkey) -> Instruction {
    let (config_account, _) = find_config_address(program_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*current_admin, true),
            AccountMeta::new_readonly(*new_admin, false),
            AccountMeta::new(config_account, false),
        ],
        data: RaffleInstruction::UpdateAdmin {}.pack(),
    }
}

/// Create create_raffle instruction; the raffle address is derived from `terms`
pub fn create_raffle(program_id: &Pubkey, terms: &RaffleTerms) -> Instruction {
    let data = RaffleInstruction::CreateRaffle {
        ticket_price: terms.ticket_price,
        max_tickets: terms.max_tickets,
        end_time: terms.end_time,
    }
    .pack();
    let (raffle_account, _) = find_raffle_address(program_id, terms);
    let (config_account, _) = find_config_address(program_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(terms.manager, true),
            AccountMeta::new(raffle_account, false),
            AccountMeta::new_readonly(config_account, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    }
}

/// Create buy_tickets instruction
pub fn buy_tickets(
    program_id: &Pubkey,
    buyer: &Pubkey,
    raffle_account: &Pubkey,
    quantity: u32,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*buyer, true),
            AccountMeta::new(*raffle_account, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: RaffleInstruction::BuyTickets { quantity }.pack(),
    }
}

/// Create request_draw instruction
pub fn request_draw(
    program_id: &Pubkey,
    payer: &Pubkey,
    raffle_account: &Pubkey,
    oracle_queue: &Pubkey,
    vrf_program: &Pubkey,
) -> Instruction {
    let (config_account, _) = find_config_address(program_id);
    let (program_identity, _) = find_program_identity_address(program_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*raffle_account, false),
            AccountMeta::new_readonly(config_account, false),
            AccountMeta::new_readonly(program_identity, false),
            AccountMeta::new(*oracle_queue, false),
            AccountMeta::new_readonly(*vrf_program, false),
            AccountMeta::new_readonly(slot_hashes::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: RaffleInstruction::RequestDraw {}.pack(),
    }
}

/// Create draw_callback instruction, as the oracle would send it
pub fn draw_callback(
    program_id: &Pubkey,
    oracle_identity: &Pubkey,
    raffle_account: &Pubkey,
    randomness: [u8; 32],
) -> Instruction {
    let (config_account, _) = find_config_address(program_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*oracle_identity, true),
            AccountMeta::new(*raffle_account, false),
            AccountMeta::new_readonly(config_account, false),
        ],
        data: RaffleInstruction::DrawCallback { randomness }.pack(),
    }
}

/// Create claim_prize instruction
pub fn claim_prize(
    program_id: &Pubkey,
    caller: &Pubkey,
    raffle_account: &Pubkey,
    winner: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*caller, true),
            AccountMeta::new(*raffle_account, false),
            AccountMeta::new(*winner, false),
        ],
        data: RaffleInstruction::ClaimPrize {}.pack(),
    }
}

/// Create close_raffle instruction
pub fn close_raffle(
    program_id: &Pubkey,
    closer: &Pubkey,
    raffle_account: &Pubkey,
    manager: &Pubkey,
) -> Instruction {
    let (config_account, _) = find_config_address(program_id);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*closer, true),
            AccountMeta::new(*raffle_account, false),
            AccountMeta::new(*manager, false),
            AccountMeta::new_readonly(config_account, false),
        ],
        data: RaffleInstruction::CloseRaffle {}.pack(),
    }
}
