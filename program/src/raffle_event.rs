use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{hash::hash, log::sol_log_data, msg, pubkey::Pubkey};

/// Emitted when the oracle callback selects a winner
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct WinnerDrawn {
    /// Raffle account the winner was drawn for
    pub raffle: Pubkey,
    /// Entrant at `winner_index`
    pub winner: Pubkey,
    pub winner_index: u32,
    /// Raw oracle output, so observers can recompute the index
    pub randomness: [u8; 32],
}

impl WinnerDrawn {
    pub const NAME: &'static str = "WinnerDrawn";

    /// First 8 bytes of `sha256("event:WinnerDrawn")`
    pub fn discriminator() -> [u8; 8] {
        let mut discriminator = [0u8; 8];
        discriminator.copy_from_slice(&hash(format!("event:{}", Self::NAME).as_bytes()).to_bytes()[..8]);
        discriminator
    }

    /// Discriminator followed by the borsh encoded event
    pub fn to_log_bytes(&self) -> Vec<u8> {
        let mut data = Self::discriminator().to_vec();
        data.extend_from_slice(&self.try_to_vec().unwrap_or_default());
        data
    }

    /// Parses a program data log entry produced by [`WinnerDrawn::emit`]
    pub fn from_log_bytes(data: &[u8]) -> Option<Self> {
        let body = data.strip_prefix(&Self::discriminator()[..])?;
        Self::try_from_slice(body).ok()
    }

    pub fn emit(&self) {
        msg!(
            "Winner drawn for raffle {}: {} (index {})",
            self.raffle,
            self.winner,
            self.winner_index
        );
        sol_log_data(&[&self.to_log_bytes()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_bytes_roundtrip() {
        let event = WinnerDrawn {
            raffle: Pubkey::new_unique(),
            winner: Pubkey::new_unique(),
            winner_index: 3,
            randomness: [9u8; 32],
        };
        let data = event.to_log_bytes();

        assert_eq!(data.len(), 8 + 32 + 32 + 4 + 32);
        assert_eq!(WinnerDrawn::from_log_bytes(&data), Some(event));
        assert_eq!(WinnerDrawn::from_log_bytes(&data[1..]), None);
    }
}
