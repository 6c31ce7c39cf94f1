// Raffle program with oracle-backed winner selection

// Raffle modules
pub mod raffle_engine;
pub mod raffle_error;
pub mod raffle_event;
pub mod raffle_instruction;
pub mod raffle_processor;
pub mod raffle_state;
pub mod utils;

// VRF module for randomness
pub mod vrf;

#[cfg(not(feature = "no-entrypoint"))]
pub mod raffle_entrypoint;

use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, pubkey::Pubkey};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    raffle_processor::Processor::process(program_id, accounts, instruction_data)
}
