use solana_program::{
    account_info::{next_account_info, AccountInfo},
    clock::UnixTimestamp,
    entrypoint::ProgramResult,
    msg,
    program::invoke,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack},
    pubkey::Pubkey,
    system_instruction, system_program,
    sysvar::{clock::Clock, slot_hashes, Sysvar},
};

use crate::{
    raffle_engine::RaffleSettings,
    raffle_error::RaffleError,
    raffle_event::WinnerDrawn,
    raffle_instruction::{RaffleInstruction, DRAW_CALLBACK_TAG},
    raffle_state::{Config, RafflePhase, RaffleRecord, RaffleTerms, CONFIG_SEED, RAFFLE_SEED},
    utils::{
        close_account, create_pda_account, find_config_address, find_program_identity_address,
        find_raffle_address, lamports_to_sol, transfer_from_program_account,
    },
    vrf::{self, CallbackAccountMeta, RequestAccounts, VrfRequest},
};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::InitializeConfig {
                vrf_program,
                oracle_queue,
                vrf_program_identity,
                min_ticket_price,
                max_duration,
            } => {
                msg!("Instruction: Initialize Config");
                let config = Config {
                    is_initialized: true,
                    admin: Pubkey::default(),
                    vrf_program,
                    oracle_queue,
                    vrf_program_identity,
                    min_ticket_price,
                    max_duration,
                };
                Self::process_initialize_config(accounts, config, program_id)
            }
            RaffleInstruction::UpdateAdmin {} => {
                msg!("Instruction: Update Admin");
                Self::process_update_admin(accounts, program_id)
            }
            RaffleInstruction::CreateRaffle {
                ticket_price,
                max_tickets,
                end_time,
            } => {
                msg!("Instruction: Create Raffle");
                Self::process_create_raffle(accounts, ticket_price, max_tickets, end_time, program_id)
            }
            RaffleInstruction::BuyTickets { quantity } => {
                msg!("Instruction: Buy Tickets");
                Self::process_buy_tickets(accounts, quantity, program_id)
            }
            RaffleInstruction::RequestDraw {} => {
                msg!("Instruction: Request Draw");
                Self::process_request_draw(accounts, program_id)
            }
            RaffleInstruction::DrawCallback { randomness } => {
                msg!("Instruction: Draw Callback");
                Self::process_draw_callback(accounts, randomness, program_id)
            }
            RaffleInstruction::ClaimPrize {} => {
                msg!("Instruction: Claim Prize");
                Self::process_claim_prize(accounts, program_id)
            }
            RaffleInstruction::CloseRaffle {} => {
                msg!("Instruction: Close Raffle");
                Self::process_close_raffle(accounts, program_id)
            }
        }
    }

    /// Creates the config PDA. Runs once; the signer becomes the admin.
    fn process_initialize_config(
        accounts: &[AccountInfo],
        mut config: Config,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let admin_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !admin_info.is_signer {
            msg!("Admin must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }
        if *system_program_info.key != system_program::id() {
            return Err(ProgramError::IncorrectProgramId);
        }

        let (expected_config_pubkey, bump_seed) = find_config_address(program_id);
        if *config_info.key != expected_config_pubkey {
            msg!("Invalid config account address");
            return Err(ProgramError::InvalidArgument);
        }
        if config_info.owner == program_id {
            msg!("Config account is already initialized");
            return Err(RaffleError::ConfigAlreadyInitialized.into());
        }
        if config.max_duration <= 0 {
            msg!("Max duration must be positive");
            return Err(ProgramError::InvalidArgument);
        }

        create_pda_account(
            admin_info,
            config_info,
            system_program_info,
            Config::LEN,
            program_id,
            &[CONFIG_SEED, &[bump_seed]],
        )?;

        config.admin = *admin_info.key;
        Config::pack(config, &mut config_info.data.borrow_mut())?;

        msg!(
            "Config initialized: Admin={}, VrfProgram={}, OracleQueue={}, MinPrice={}, MaxDuration={}s",
            config.admin,
            config.vrf_program,
            config.oracle_queue,
            config.min_ticket_price,
            config.max_duration
        );
        Ok(())
    }

    fn process_update_admin(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let current_admin_info = next_account_info(account_info_iter)?;
        let new_admin_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;

        if !current_admin_info.is_signer {
            msg!("Current admin must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        let mut config = Self::load_config(config_info, program_id)?;
        if config.admin != *current_admin_info.key {
            msg!("Only the current admin can update admin rights");
            return Err(RaffleError::NotConfigAdmin.into());
        }

        config.admin = *new_admin_info.key;
        Config::pack(config, &mut config_info.data.borrow_mut())?;

        msg!("Admin updated successfully to: {}", new_admin_info.key);
        Ok(())
    }

    fn process_create_raffle(
        accounts: &[AccountInfo],
        ticket_price: u64,
        max_tickets: u32,
        end_time: UnixTimestamp,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let manager_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !manager_info.is_signer {
            msg!("Raffle manager must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }
        if *system_program_info.key != system_program::id() {
            return Err(ProgramError::IncorrectProgramId);
        }

        let settings = RaffleSettings::from(&Self::load_config(config_info, program_id)?);
        let now = Clock::get()?.unix_timestamp;
        let terms = RaffleTerms {
            manager: *manager_info.key,
            ticket_price,
            max_tickets,
            end_time,
        };
        let record = RaffleRecord::create(terms, now, &settings)?;

        let (expected_raffle_pubkey, bump_seed) = find_raffle_address(program_id, &terms);
        if *raffle_info.key != expected_raffle_pubkey {
            msg!("Raffle account is not the address derived from its terms");
            return Err(RaffleError::RaffleAddressMismatch.into());
        }
        if raffle_info.owner == program_id || !raffle_info.data_is_empty() {
            msg!("Raffle account {} already exists", raffle_info.key);
            return Err(RaffleError::RecordAlreadyExists.into());
        }

        let space = RaffleRecord::account_space(max_tickets);
        let ticket_price_bytes = ticket_price.to_le_bytes();
        let max_tickets_bytes = max_tickets.to_le_bytes();
        let end_time_bytes = end_time.to_le_bytes();
        create_pda_account(
            manager_info,
            raffle_info,
            system_program_info,
            space,
            program_id,
            &[
                RAFFLE_SEED,
                manager_info.key.as_ref(),
                &ticket_price_bytes,
                &max_tickets_bytes,
                &end_time_bytes,
                &[bump_seed],
            ],
        )?;

        record.pack_into(&mut raffle_info.data.borrow_mut())?;

        msg!(
            "Raffle created: {} Price={} MaxTickets={} EndTime={} Space={}",
            raffle_info.key,
            ticket_price,
            max_tickets,
            end_time,
            space
        );
        Ok(())
    }

    fn process_buy_tickets(
        accounts: &[AccountInfo],
        quantity: u32,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let buyer_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !buyer_info.is_signer {
            msg!("Buyer must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }
        if *system_program_info.key != system_program::id() {
            return Err(ProgramError::IncorrectProgramId);
        }

        let mut record = Self::load_raffle(raffle_info, program_id)?;
        let now = Clock::get()?.unix_timestamp;
        let cost = record.buy_tickets(buyer_info.key, quantity, now)?;

        if buyer_info.lamports() < cost {
            msg!(
                "Insufficient funds: needed {} lamports, had {} lamports",
                cost,
                buyer_info.lamports()
            );
            return Err(RaffleError::InsufficientFunds.into());
        }

        invoke(
            &system_instruction::transfer(buyer_info.key, raffle_info.key, cost),
            &[
                buyer_info.clone(),
                raffle_info.clone(),
                system_program_info.clone(),
            ],
        )?;

        record.pack_into(&mut raffle_info.data.borrow_mut())?;

        msg!(
            "Purchased {} tickets for {} ({} SOL). Sold {}/{}",
            quantity,
            buyer_info.key,
            lamports_to_sol(cost),
            record.entrants.len(),
            record.terms.max_tickets
        );
        Ok(())
    }

    /// Step 1 of the draw: mark the raffle and ask the oracle for randomness
    fn process_request_draw(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let payer_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;
        let program_identity_info = next_account_info(account_info_iter)?;
        let oracle_queue_info = next_account_info(account_info_iter)?;
        let vrf_program_info = next_account_info(account_info_iter)?;
        let slot_hashes_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        // Anyone can request the draw; the payer covers the oracle fee
        if !payer_info.is_signer {
            msg!("Payer must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        let mut record = Self::load_raffle(raffle_info, program_id)?;
        let config = Self::load_config(config_info, program_id)?;
        let now = Clock::get()?.unix_timestamp;

        record.request_draw(now)?;

        if *oracle_queue_info.key != config.oracle_queue {
            msg!("Oracle queue {} is not the configured queue", oracle_queue_info.key);
            return Err(RaffleError::InvalidOracleQueue.into());
        }
        if *vrf_program_info.key != config.vrf_program {
            msg!("VRF program {} is not the configured program", vrf_program_info.key);
            return Err(RaffleError::InvalidVrfProgram.into());
        }
        let (expected_identity, identity_bump) = find_program_identity_address(program_id);
        if *program_identity_info.key != expected_identity {
            msg!("Invalid program identity account");
            return Err(ProgramError::InvalidArgument);
        }
        if *slot_hashes_info.key != slot_hashes::id() {
            return Err(ProgramError::InvalidArgument);
        }

        record.pack_into(&mut raffle_info.data.borrow_mut())?;

        let request = VrfRequest {
            caller_seed: raffle_info.key.to_bytes(),
            callback_program_id: *program_id,
            callback_discriminator: vec![DRAW_CALLBACK_TAG],
            callback_accounts: vec![
                CallbackAccountMeta {
                    pubkey: *raffle_info.key,
                    is_signer: false,
                    is_writable: true,
                },
                CallbackAccountMeta {
                    pubkey: *config_info.key,
                    is_signer: false,
                    is_writable: false,
                },
            ],
            callback_args: vec![],
        };
        vrf::request_randomness(
            RequestAccounts {
                payer: payer_info,
                program_identity: program_identity_info,
                oracle_queue: oracle_queue_info,
                vrf_program: vrf_program_info,
                slot_hashes: slot_hashes_info,
                system_program: system_program_info,
            },
            &request,
            identity_bump,
        )?;

        msg!(
            "Draw requested for raffle {} with {} entrants",
            raffle_info.key,
            record.entrants.len()
        );
        Ok(())
    }

    /// Step 2 of the draw: the oracle delivers randomness and the winner is fixed
    fn process_draw_callback(
        accounts: &[AccountInfo],
        randomness: [u8; 32],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let oracle_identity_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;

        let mut record = Self::load_raffle(raffle_info, program_id)?;
        let settings = RaffleSettings::from(&Self::load_config(config_info, program_id)?);

        msg!("Received random data: 0x{}", vrf::randomness_hex(&randomness));
        let winner_index = record.fulfill_draw(
            oracle_identity_info.key,
            oracle_identity_info.is_signer,
            &randomness,
            &settings,
        )?;
        let winner = *record.winner().ok_or(RaffleError::InvalidRaffleData)?;
        record.pack_into(&mut raffle_info.data.borrow_mut())?;

        WinnerDrawn {
            raffle: *raffle_info.key,
            winner,
            winner_index,
            randomness,
        }
        .emit();
        Ok(())
    }

    /// Pays the pool to the recorded winner; any signer may submit it
    fn process_claim_prize(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let caller_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let winner_info = next_account_info(account_info_iter)?;

        if !caller_info.is_signer {
            msg!("Caller must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        let mut record = Self::load_raffle(raffle_info, program_id)?;
        let prize = record.claim_prize(winner_info.key)?;
        record.pack_into(&mut raffle_info.data.borrow_mut())?;

        transfer_from_program_account(raffle_info, winner_info, prize)?;

        msg!(
            "Prize of {} lamports claimed by {} for raffle {}",
            prize,
            winner_info.key,
            raffle_info.key
        );
        Ok(())
    }

    fn process_close_raffle(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let closer_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let manager_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;

        if !closer_info.is_signer {
            msg!("Closer must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature);
        }

        let record = Self::load_raffle(raffle_info, program_id)?;
        let settings = RaffleSettings::from(&Self::load_config(config_info, program_id)?);
        let now = Clock::get()?.unix_timestamp;

        record.authorize_close(closer_info.key, &settings)?;
        // The rent always goes back to the manager, whoever closes
        if *manager_info.key != record.terms.manager {
            msg!("Refund account must be the raffle manager");
            return Err(RaffleError::ManagerMismatch.into());
        }

        msg!(
            "Closing raffle {} in phase {:?}",
            raffle_info.key,
            RafflePhase::of(Some(&record), now)
        );
        close_account(raffle_info, manager_info)
    }

    fn load_config(config_info: &AccountInfo, program_id: &Pubkey) -> Result<Config, ProgramError> {
        if config_info.owner != program_id {
            msg!("Config account must be owned by this program");
            return Err(RaffleError::ConfigNotInitialized.into());
        }
        let (expected_config_pubkey, _) = find_config_address(program_id);
        if *config_info.key != expected_config_pubkey {
            msg!("Invalid config account address");
            return Err(ProgramError::InvalidArgument);
        }

        let config = Config::unpack_unchecked(&config_info.data.borrow())?;
        if !config.is_initialized() {
            return Err(RaffleError::ConfigNotInitialized.into());
        }
        Ok(config)
    }

    /// Reads a raffle and checks that it lives at the address its terms derive to
    fn load_raffle(
        raffle_info: &AccountInfo,
        program_id: &Pubkey,
    ) -> Result<RaffleRecord, ProgramError> {
        if raffle_info.owner != program_id {
            msg!("Raffle account must be owned by this program");
            return Err(ProgramError::IncorrectProgramId);
        }

        let record = RaffleRecord::unpack(&raffle_info.data.borrow())?;
        let (expected_raffle_pubkey, _) = find_raffle_address(program_id, &record.terms);
        if *raffle_info.key != expected_raffle_pubkey {
            msg!("Raffle account is not the address derived from its terms");
            return Err(RaffleError::RaffleAddressMismatch.into());
        }
        Ok(record)
    }
}
