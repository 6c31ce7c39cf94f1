use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::Pubkey,
};
use std::io::{self, Write};

use crate::raffle_error::RaffleError;

/// Seed prefix of every raffle PDA
pub const RAFFLE_SEED: &[u8] = b"raffle";
/// Seed of the program config PDA
pub const CONFIG_SEED: &[u8] = b"config";
/// Seed of the PDA that signs randomness requests on behalf of the program
pub const IDENTITY_SEED: &[u8] = b"identity";

/// Default minimum ticket price in lamports (0.0001 SOL)
pub const MIN_TICKET_PRICE_LAMPORTS: u64 = 100_000;
/// Default maximum raffle duration in seconds
pub const MAX_RAFFLE_DURATION_SECS: i64 = 30 * 24 * 60 * 60;

/// Size of one entrant identity in the raffle account
pub const ENTRANT_SIZE: usize = 32;

/// Immutable configuration of a raffle. Every field is part of the raffle's
/// derived address, so a closed raffle can only be recreated with the same terms.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaffleTerms {
    /// Creator of the raffle, receives the rent refund on close
    pub manager: Pubkey,
    /// Price per ticket in lamports
    pub ticket_price: u64,
    /// Maximum number of tickets (entrants)
    pub max_tickets: u32,
    /// No tickets can be bought at or after this time
    pub end_time: UnixTimestamp,
}

/// Progress of the winner draw.
///
/// Persisted as `winner_index: Option<u32>`, `draw_started: bool` and
/// `claimed: bool`; this enum only admits the flag combinations that can
/// actually occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawState {
    /// No randomness requested yet
    Open,
    /// Randomness requested, waiting for the oracle callback
    Requested,
    /// Winner selected, prize not yet paid out
    Drawn { winner_index: u32 },
    /// Prize paid out to the winner
    Claimed { winner_index: u32 },
}

impl DrawState {
    pub fn is_started(&self) -> bool {
        !matches!(self, DrawState::Open)
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, DrawState::Claimed { .. })
    }

    pub fn winner_index(&self) -> Option<u32> {
        match *self {
            DrawState::Drawn { winner_index } | DrawState::Claimed { winner_index } => {
                Some(winner_index)
            }
            DrawState::Open | DrawState::Requested => None,
        }
    }

    /// Rebuilds the state from its persisted flags, rejecting impossible combinations.
    pub fn from_flags(winner_index: Option<u32>, draw_started: bool, claimed: bool) -> Option<Self> {
        match (winner_index, draw_started, claimed) {
            (None, false, false) => Some(DrawState::Open),
            (None, true, false) => Some(DrawState::Requested),
            (Some(winner_index), true, false) => Some(DrawState::Drawn { winner_index }),
            (Some(winner_index), true, true) => Some(DrawState::Claimed { winner_index }),
            _ => None,
        }
    }
}

/// Lifecycle phase of a raffle, derived from its record and the clock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RafflePhase {
    /// Open for sales, no tickets sold yet
    Created,
    /// Open for sales with at least one ticket sold
    Selling,
    /// Sold out or past the end time, draw not requested
    Ended,
    /// Waiting for the oracle callback
    DrawRequested,
    /// Winner known, prize unclaimed
    WinnerSet,
    /// Prize paid out
    Claimed,
    /// Account deleted
    Closed,
}

impl RafflePhase {
    pub fn of(record: Option<&RaffleRecord>, now: UnixTimestamp) -> Self {
        let record = match record {
            Some(record) => record,
            None => return RafflePhase::Closed,
        };
        match record.draw {
            DrawState::Open if record.is_over(now) => RafflePhase::Ended,
            DrawState::Open if record.entrants.is_empty() => RafflePhase::Created,
            DrawState::Open => RafflePhase::Selling,
            DrawState::Requested => RafflePhase::DrawRequested,
            DrawState::Drawn { .. } => RafflePhase::WinnerSet,
            DrawState::Claimed { .. } => RafflePhase::Claimed,
        }
    }
}

/// Raffle account data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaffleRecord {
    pub terms: RaffleTerms,
    pub draw: DrawState,
    /// One entry per ticket in purchase order; capacity is reserved up to
    /// `max_tickets` and never exceeded.
    pub entrants: Vec<Pubkey>,
}

impl RaffleRecord {
    /// Account size for a raffle with `max_tickets` tickets
    pub const fn account_space(max_tickets: u32) -> usize {
        32 + // manager
            8 + // ticket_price
            4 + // max_tickets
            8 + // end_time
            5 + // winner_index (Option<u32>)
            1 + // draw_started
            1 + // claimed
            4 + // entrants length
            ENTRANT_SIZE * max_tickets as usize
    }

    /// Fresh record with no entrants
    pub fn new(terms: RaffleTerms) -> Self {
        Self {
            terms,
            draw: DrawState::Open,
            entrants: Vec::with_capacity(terms.max_tickets as usize),
        }
    }

    pub fn remaining_tickets(&self) -> u32 {
        self.terms.max_tickets - self.entrants.len() as u32
    }

    pub fn is_sold_out(&self) -> bool {
        self.entrants.len() >= self.terms.max_tickets as usize
    }

    /// Over once the end time is reached or every ticket is sold
    pub fn is_over(&self, now: UnixTimestamp) -> bool {
        self.is_sold_out() || now >= self.terms.end_time
    }

    pub fn winner(&self) -> Option<&Pubkey> {
        self.draw
            .winner_index()
            .and_then(|index| self.entrants.get(index as usize))
    }

    /// Lamports held in escrow for the winner
    pub fn prize_pool(&self) -> Option<u64> {
        self.terms
            .ticket_price
            .checked_mul(self.entrants.len() as u64)
    }

    /// Reads a record from raffle account data. Trailing unused capacity is ignored.
    pub fn unpack(src: &[u8]) -> Result<Self, ProgramError> {
        let record = Self::deserialize(&mut &src[..]).map_err(|_| RaffleError::InvalidRaffleData)?;
        if src.len() < Self::account_space(record.terms.max_tickets) {
            return Err(RaffleError::InvalidRaffleData.into());
        }
        Ok(record)
    }

    /// Writes the record into raffle account data
    pub fn pack_into(&self, dst: &mut [u8]) -> Result<(), ProgramError> {
        if dst.len() < Self::account_space(self.terms.max_tickets) {
            return Err(ProgramError::AccountDataTooSmall);
        }
        let mut cursor: &mut [u8] = dst;
        self.serialize(&mut cursor)
            .map_err(|_| ProgramError::AccountDataTooSmall)
    }
}

impl BorshSerialize for RaffleRecord {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.terms.serialize(writer)?;
        self.draw.winner_index().serialize(writer)?;
        self.draw.is_started().serialize(writer)?;
        self.draw.is_claimed().serialize(writer)?;
        self.entrants.serialize(writer)
    }
}

impl BorshDeserialize for RaffleRecord {
    fn deserialize(buf: &mut &[u8]) -> io::Result<Self> {
        let terms = RaffleTerms::deserialize(buf)?;
        let winner_index = Option::<u32>::deserialize(buf)?;
        let draw_started = bool::deserialize(buf)?;
        let claimed = bool::deserialize(buf)?;
        let entrant_count = u32::deserialize(buf)?;

        let invalid = |reason: &str| io::Error::new(io::ErrorKind::InvalidData, reason.to_string());
        if entrant_count > terms.max_tickets {
            return Err(invalid("more entrants than max_tickets"));
        }
        // One allocation of the full ticket capacity
        let mut entrants = Vec::with_capacity(terms.max_tickets as usize);
        for _ in 0..entrant_count {
            entrants.push(Pubkey::deserialize(buf)?);
        }

        let draw = DrawState::from_flags(winner_index, draw_started, claimed)
            .ok_or_else(|| invalid("inconsistent draw flags"))?;
        if let Some(index) = draw.winner_index() {
            if index as usize >= entrants.len() {
                return Err(invalid("winner index out of range"));
            }
        }

        Ok(Self {
            terms,
            draw,
            entrants,
        })
    }
}

/// Program configuration account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Is the account initialized
    pub is_initialized: bool,
    /// Admin authority, may force-close settled or empty raffles
    pub admin: Pubkey,
    /// Program that serves randomness requests
    pub vrf_program: Pubkey,
    /// Oracle queue that randomness requests must target
    pub oracle_queue: Pubkey,
    /// Identity the oracle signs draw callbacks with
    pub vrf_program_identity: Pubkey,
    /// Minimum ticket price in lamports
    pub min_ticket_price: u64,
    /// Maximum raffle duration in seconds
    pub max_duration: i64,
}

impl Sealed for Config {}

impl IsInitialized for Config {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Pack for Config {
    const LEN: usize = 1 + 32 + 32 + 32 + 32 + 8 + 8;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, Config::LEN];
        let (
            is_initialized,
            admin,
            vrf_program,
            oracle_queue,
            vrf_program_identity,
            min_ticket_price,
            max_duration,
        ) = array_refs![src, 1, 32, 32, 32, 32, 8, 8];

        let is_initialized = match is_initialized {
            [0] => false,
            [1] => true,
            _ => return Err(ProgramError::InvalidAccountData),
        };

        Ok(Config {
            is_initialized,
            admin: Pubkey::new_from_array(*admin),
            vrf_program: Pubkey::new_from_array(*vrf_program),
            oracle_queue: Pubkey::new_from_array(*oracle_queue),
            vrf_program_identity: Pubkey::new_from_array(*vrf_program_identity),
            min_ticket_price: u64::from_le_bytes(*min_ticket_price),
            max_duration: i64::from_le_bytes(*max_duration),
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, Config::LEN];
        let (
            is_initialized_dst,
            admin_dst,
            vrf_program_dst,
            oracle_queue_dst,
            vrf_program_identity_dst,
            min_ticket_price_dst,
            max_duration_dst,
        ) = mut_array_refs![dst, 1, 32, 32, 32, 32, 8, 8];

        is_initialized_dst[0] = self.is_initialized as u8;
        admin_dst.copy_from_slice(self.admin.as_ref());
        vrf_program_dst.copy_from_slice(self.vrf_program.as_ref());
        oracle_queue_dst.copy_from_slice(self.oracle_queue.as_ref());
        vrf_program_identity_dst.copy_from_slice(self.vrf_program_identity.as_ref());
        *min_ticket_price_dst = self.min_ticket_price.to_le_bytes();
        *max_duration_dst = self.max_duration.to_le_bytes();
    }
}
