// Address derivation and account helpers
use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    msg,
    program::{invoke, invoke_signed},
    program_error::ProgramError,
    pubkey::Pubkey,
    rent::Rent,
    system_instruction, system_program,
    sysvar::Sysvar,
};

use crate::raffle_state::{RaffleTerms, CONFIG_SEED, IDENTITY_SEED, RAFFLE_SEED};

/// Find the program derived address of a raffle.
///
/// Every term is encoded at a fixed width, so distinct terms always give
/// distinct seeds.
pub fn find_raffle_address(program_id: &Pubkey, terms: &RaffleTerms) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            RAFFLE_SEED,
            terms.manager.as_ref(),
            &terms.ticket_price.to_le_bytes(),
            &terms.max_tickets.to_le_bytes(),
            &terms.end_time.to_le_bytes(),
        ],
        program_id,
    )
}

/// Find the program derived address of the config account
pub fn find_config_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[CONFIG_SEED], program_id)
}

/// Find the PDA that signs randomness requests for this program
pub fn find_program_identity_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[IDENTITY_SEED], program_id)
}

/// Creates a rent-exempt, program-owned account at a PDA.
///
/// Works even if someone pre-funded the address, which would make a plain
/// `create_account` fail.
pub fn create_pda_account<'a>(
    payer: &AccountInfo<'a>,
    new_account: &AccountInfo<'a>,
    system_program_info: &AccountInfo<'a>,
    space: usize,
    owner: &Pubkey,
    signer_seeds: &[&[u8]],
) -> ProgramResult {
    let rent = Rent::get()?;
    let required_lamports = rent.minimum_balance(space);

    if new_account.lamports() == 0 {
        return invoke_signed(
            &system_instruction::create_account(
                payer.key,
                new_account.key,
                required_lamports,
                space as u64,
                owner,
            ),
            &[payer.clone(), new_account.clone(), system_program_info.clone()],
            &[signer_seeds],
        );
    }

    let top_up = required_lamports.saturating_sub(new_account.lamports());
    if top_up > 0 {
        invoke(
            &system_instruction::transfer(payer.key, new_account.key, top_up),
            &[payer.clone(), new_account.clone(), system_program_info.clone()],
        )?;
    }
    invoke_signed(
        &system_instruction::allocate(new_account.key, space as u64),
        &[new_account.clone(), system_program_info.clone()],
        &[signer_seeds],
    )?;
    invoke_signed(
        &system_instruction::assign(new_account.key, owner),
        &[new_account.clone(), system_program_info.clone()],
        &[signer_seeds],
    )
}

/// Moves lamports out of a program-owned account
pub fn transfer_from_program_account(
    from: &AccountInfo,
    to: &AccountInfo,
    amount: u64,
) -> ProgramResult {
    let from_balance = from
        .lamports()
        .checked_sub(amount)
        .ok_or(ProgramError::InsufficientFunds)?;
    let to_balance = to
        .lamports()
        .checked_add(amount)
        .ok_or(ProgramError::InvalidArgument)?;

    **from.try_borrow_mut_lamports()? = from_balance;
    **to.try_borrow_mut_lamports()? = to_balance;
    Ok(())
}

/// Drains a program-owned account into `destination`, shrinks its data to
/// zero and hands it back to the system program, so the address can be
/// created again later in the same transaction.
pub fn close_account(account: &AccountInfo, destination: &AccountInfo) -> ProgramResult {
    let refund = account.lamports();
    transfer_from_program_account(account, destination, refund)?;

    account.try_borrow_mut_data()?.fill(0);
    account.realloc(0, false)?;
    account.assign(&system_program::id());
    msg!("Closed {}: refunded {} lamports to {}", account.key, refund, destination.key);
    Ok(())
}

/// Convert lamports to SOL (for display purposes)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 1_000_000_000.0
}
