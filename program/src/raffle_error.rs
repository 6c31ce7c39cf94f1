use solana_program::{
    decode_error::DecodeError, msg, program_error::PrintProgramError, program_error::ProgramError,
};
use thiserror::Error;

/// Errors that may be returned by the Raffle program
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Invalid instruction data passed
    #[error("Invalid instruction data")]
    InvalidInstructionData,

    // Creation
    #[error("Raffle end time must be in the future")]
    EndTimeInPast,

    #[error("Raffle duration exceeds the configured maximum")]
    DurationTooLong,

    #[error("Max tickets must be greater than zero")]
    ZeroTickets,

    /// The raffle account for this many tickets would not fit in one allocation
    #[error("Max tickets exceeds the raffle account capacity")]
    TooManyTickets,

    #[error("Ticket price is below the configured minimum")]
    PriceTooLow,

    #[error("max_tickets * ticket_price exceeds u64")]
    PrizePoolOverflow,

    #[error("A raffle with this configuration already exists")]
    RecordAlreadyExists,

    // Ticket sales
    #[error("Raffle has ended")]
    RaffleEnded,

    #[error("Ticket quantity must be greater than zero")]
    ZeroQuantity,

    #[error("Not enough tickets remaining")]
    InsufficientTicketsRemaining,

    #[error("Insufficient funds for operation")]
    InsufficientFunds,

    // Draw request
    #[error("Winner already drawn or draw already requested")]
    WinnerAlreadyDrawn,

    #[error("Raffle has not ended")]
    RaffleNotOver,

    #[error("No tickets were sold")]
    NoEntrants,

    #[error("Oracle queue does not match the configured queue")]
    InvalidOracleQueue,

    #[error("VRF program does not match the configured program")]
    InvalidVrfProgram,

    // Draw callback
    #[error("Draw has not been requested")]
    DrawNotStarted,

    #[error("Draw callback already invoked")]
    CallbackAlreadyInvoked,

    #[error("Callback was not signed by the oracle identity")]
    CallbackNotFromOracle,

    // Claim
    #[error("Winner not yet drawn")]
    WinnerNotYetDrawn,

    #[error("Claimed identity is not the winner")]
    NotWinner,

    #[error("Prize already claimed")]
    PrizeAlreadyClaimed,

    // Close
    #[error("Only the raffle manager or the program admin can close a raffle")]
    UnauthorizedCloser,

    #[error("Raffle has entrants and an unclaimed prize")]
    RaffleStillActive,

    #[error("Refund account is not the raffle manager")]
    ManagerMismatch,

    // Accounts and configuration
    #[error("Raffle account does not match its derived address")]
    RaffleAddressMismatch,

    #[error("Raffle account data is invalid")]
    InvalidRaffleData,

    #[error("Config account is already initialized")]
    ConfigAlreadyInitialized,

    #[error("Config account is not initialized")]
    ConfigNotInitialized,

    #[error("Only the program admin can perform this action")]
    NotConfigAdmin,
}

impl From<RaffleError> for ProgramError {
    fn from(e: RaffleError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for RaffleError {
    fn type_of() -> &'static str {
        "Raffle Error"
    }
}

impl PrintProgramError for RaffleError {
    fn print<E>(&self) {
        msg!(&self.to_string());
    }
}
