//! Raffle state machine.
//!
//! Every transition validates all of its preconditions before touching the
//! record, so a rejected call leaves the record exactly as it was. Lamport
//! movements are left to the processor; the transitions return the amounts.

use solana_program::{clock::UnixTimestamp, entrypoint::MAX_PERMITTED_DATA_INCREASE, pubkey::Pubkey};
use std::iter;

use crate::{
    raffle_error::RaffleError,
    raffle_state::{
        Config, DrawState, RaffleRecord, RaffleTerms, MAX_RAFFLE_DURATION_SECS,
        MIN_TICKET_PRICE_LAMPORTS,
    },
    vrf,
};

/// Environment values the engine needs at call time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaffleSettings {
    /// Program-level authority allowed to close any settled raffle
    pub admin: Pubkey,
    /// Identity the oracle signs draw callbacks with
    pub oracle_identity: Pubkey,
    pub min_ticket_price: u64,
    pub max_duration: i64,
}

impl RaffleSettings {
    pub fn new(admin: Pubkey, oracle_identity: Pubkey) -> Self {
        Self {
            admin,
            oracle_identity,
            min_ticket_price: MIN_TICKET_PRICE_LAMPORTS,
            max_duration: MAX_RAFFLE_DURATION_SECS,
        }
    }
}

impl From<&Config> for RaffleSettings {
    fn from(config: &Config) -> Self {
        Self {
            admin: config.admin,
            oracle_identity: config.vrf_program_identity,
            min_ticket_price: config.min_ticket_price,
            max_duration: config.max_duration,
        }
    }
}

/// Largest ticket count whose account can still be created through a CPI
pub const MAX_TICKETS_PER_RAFFLE: u32 =
    ((MAX_PERMITTED_DATA_INCREASE - RaffleRecord::account_space(0)) / 32) as u32;

impl RaffleRecord {
    /// Validates raffle terms and returns the new, empty record.
    pub fn create(
        terms: RaffleTerms,
        now: UnixTimestamp,
        settings: &RaffleSettings,
    ) -> Result<Self, RaffleError> {
        if terms.end_time <= now {
            return Err(RaffleError::EndTimeInPast);
        }
        match terms.end_time.checked_sub(now) {
            Some(duration) if duration <= settings.max_duration => {}
            _ => return Err(RaffleError::DurationTooLong),
        }
        if terms.max_tickets == 0 {
            return Err(RaffleError::ZeroTickets);
        }
        if terms.max_tickets > MAX_TICKETS_PER_RAFFLE {
            return Err(RaffleError::TooManyTickets);
        }
        if terms.ticket_price == 0 || terms.ticket_price < settings.min_ticket_price {
            return Err(RaffleError::PriceTooLow);
        }
        terms
            .ticket_price
            .checked_mul(terms.max_tickets as u64)
            .ok_or(RaffleError::PrizePoolOverflow)?;

        Ok(Self::new(terms))
    }

    /// Appends `quantity` tickets for `buyer` and returns the lamports owed.
    pub fn buy_tickets(
        &mut self,
        buyer: &Pubkey,
        quantity: u32,
        now: UnixTimestamp,
    ) -> Result<u64, RaffleError> {
        if now >= self.terms.end_time {
            return Err(RaffleError::RaffleEnded);
        }
        if quantity == 0 {
            return Err(RaffleError::ZeroQuantity);
        }
        if quantity > self.remaining_tickets() {
            return Err(RaffleError::InsufficientTicketsRemaining);
        }
        let cost = self
            .terms
            .ticket_price
            .checked_mul(quantity as u64)
            .ok_or(RaffleError::PrizePoolOverflow)?;

        self.entrants
            .extend(iter::repeat(*buyer).take(quantity as usize));
        Ok(cost)
    }

    /// Marks the draw as started. The caller is responsible for sending the
    /// randomness request in the same transaction.
    pub fn request_draw(&mut self, now: UnixTimestamp) -> Result<(), RaffleError> {
        if self.draw.is_started() {
            return Err(RaffleError::WinnerAlreadyDrawn);
        }
        if !self.is_over(now) {
            return Err(RaffleError::RaffleNotOver);
        }
        if self.entrants.is_empty() {
            return Err(RaffleError::NoEntrants);
        }

        self.draw = DrawState::Requested;
        Ok(())
    }

    /// Applies the oracle's randomness and returns the winner index.
    ///
    /// The caller identity is checked after the state checks so a replayed
    /// or premature callback is reported as such whoever sends it.
    pub fn fulfill_draw(
        &mut self,
        caller: &Pubkey,
        caller_signed: bool,
        randomness: &[u8; 32],
        settings: &RaffleSettings,
    ) -> Result<u32, RaffleError> {
        match self.draw {
            DrawState::Open => return Err(RaffleError::DrawNotStarted),
            DrawState::Drawn { .. } | DrawState::Claimed { .. } => {
                return Err(RaffleError::CallbackAlreadyInvoked)
            }
            DrawState::Requested => {}
        }
        if !caller_signed || *caller != settings.oracle_identity {
            return Err(RaffleError::CallbackNotFromOracle);
        }

        let winner_index = vrf::winner_index(randomness, self.entrants.len() as u32)
            .ok_or(RaffleError::NoEntrants)?;
        self.draw = DrawState::Drawn { winner_index };
        Ok(winner_index)
    }

    /// Marks the prize as paid to `claimed_winner` and returns the prize amount.
    pub fn claim_prize(&mut self, claimed_winner: &Pubkey) -> Result<u64, RaffleError> {
        let winner_index = match self.draw {
            DrawState::Open | DrawState::Requested => {
                return Err(RaffleError::WinnerNotYetDrawn)
            }
            DrawState::Claimed { .. } => return Err(RaffleError::PrizeAlreadyClaimed),
            DrawState::Drawn { winner_index } => winner_index,
        };
        if self.entrants.get(winner_index as usize) != Some(claimed_winner) {
            return Err(RaffleError::NotWinner);
        }
        let prize = self.prize_pool().ok_or(RaffleError::PrizePoolOverflow)?;

        self.draw = DrawState::Claimed { winner_index };
        Ok(prize)
    }

    /// Checks that `signer` may delete this raffle now.
    pub fn authorize_close(
        &self,
        signer: &Pubkey,
        settings: &RaffleSettings,
    ) -> Result<(), RaffleError> {
        if *signer != self.terms.manager && *signer != settings.admin {
            return Err(RaffleError::UnauthorizedCloser);
        }
        if !self.draw.is_claimed() && !self.entrants.is_empty() {
            return Err(RaffleError::RaffleStillActive);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raffle_state::RafflePhase;

    const NOW: UnixTimestamp = 1_700_000_000;

    struct Fixture {
        settings: RaffleSettings,
        manager: Pubkey,
        oracle: Pubkey,
    }

    impl Fixture {
        fn new() -> Self {
            let manager = Pubkey::new_unique();
            let oracle = Pubkey::new_unique();
            Self {
                settings: RaffleSettings::new(Pubkey::new_unique(), oracle),
                manager,
                oracle,
            }
        }

        fn terms(&self, ticket_price: u64, max_tickets: u32, end_time: UnixTimestamp) -> RaffleTerms {
            RaffleTerms {
                manager: self.manager,
                ticket_price,
                max_tickets,
                end_time,
            }
        }

        fn raffle(&self, ticket_price: u64, max_tickets: u32, duration: i64) -> RaffleRecord {
            RaffleRecord::create(
                self.terms(ticket_price, max_tickets, NOW + duration),
                NOW,
                &self.settings,
            )
            .unwrap()
        }

        fn randomness(value: u8) -> [u8; 32] {
            let mut randomness = [0u8; 32];
            randomness[0] = value;
            randomness
        }
    }

    fn assert_invariants(record: &RaffleRecord) {
        assert!(record.entrants.len() <= record.terms.max_tickets as usize);
        if let Some(index) = record.draw.winner_index() {
            assert!((index as usize) < record.entrants.len());
        }
        if record.draw.is_claimed() {
            assert!(record.draw.winner_index().is_some());
        }
        if !record.draw.is_started() {
            assert!(record.draw.winner_index().is_none());
        }
    }

    #[test]
    fn create_validates_terms() {
        let f = Fixture::new();
        let create = |price, max, end| RaffleRecord::create(f.terms(price, max, end), NOW, &f.settings);

        assert_eq!(create(100_000, 1, NOW), Err(RaffleError::EndTimeInPast));
        assert_eq!(create(100_000, 1, NOW - 1), Err(RaffleError::EndTimeInPast));
        assert_eq!(
            create(100_000, 1, NOW + MAX_RAFFLE_DURATION_SECS + 1),
            Err(RaffleError::DurationTooLong)
        );
        assert!(create(100_000, 1, NOW + MAX_RAFFLE_DURATION_SECS).is_ok());
        assert_eq!(create(100_000, 0, NOW + 60), Err(RaffleError::ZeroTickets));
        assert_eq!(
            create(100_000, MAX_TICKETS_PER_RAFFLE + 1, NOW + 60),
            Err(RaffleError::TooManyTickets)
        );
        assert_eq!(create(0, 1, NOW + 60), Err(RaffleError::PriceTooLow));
        assert_eq!(create(99_999, 1, NOW + 60), Err(RaffleError::PriceTooLow));
        assert_eq!(
            create(u64::MAX / 2, 3, NOW + 60),
            Err(RaffleError::PrizePoolOverflow)
        );
    }

    #[test]
    fn create_rejects_zero_price_even_without_minimum() {
        let mut f = Fixture::new();
        f.settings.min_ticket_price = 0;
        let result = RaffleRecord::create(f.terms(0, 1, NOW + 60), NOW, &f.settings);
        assert_eq!(result, Err(RaffleError::PriceTooLow));
    }

    #[test]
    fn created_record_is_empty() {
        let f = Fixture::new();
        let record = f.raffle(100_000, 5, 120);

        assert_eq!(record.draw, DrawState::Open);
        assert!(record.entrants.is_empty());
        assert!(record.entrants.capacity() >= 5);
        assert_eq!(RafflePhase::of(Some(&record), NOW), RafflePhase::Created);
    }

    #[test]
    fn max_tickets_fits_in_one_allocation() {
        assert!(
            RaffleRecord::account_space(MAX_TICKETS_PER_RAFFLE) <= MAX_PERMITTED_DATA_INCREASE
        );
        assert!(
            RaffleRecord::account_space(MAX_TICKETS_PER_RAFFLE + 1) > MAX_PERMITTED_DATA_INCREASE
        );
    }

    #[test]
    fn buy_appends_in_order_and_charges() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 5, 120);
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();

        assert_eq!(record.buy_tickets(&alice, 2, NOW), Ok(200_000));
        assert_eq!(record.buy_tickets(&bob, 1, NOW + 1), Ok(100_000));
        assert_eq!(record.entrants, vec![alice, alice, bob]);
        assert_eq!(RafflePhase::of(Some(&record), NOW), RafflePhase::Selling);
        assert_invariants(&record);
    }

    #[test]
    fn buy_exactly_remaining_capacity() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 3, 120);
        let buyer = Pubkey::new_unique();

        record.buy_tickets(&buyer, 1, NOW).unwrap();
        assert_eq!(
            record.buy_tickets(&buyer, 3, NOW),
            Err(RaffleError::InsufficientTicketsRemaining)
        );
        assert_eq!(record.entrants.len(), 1);

        assert_eq!(record.buy_tickets(&buyer, 2, NOW), Ok(200_000));
        assert!(record.is_sold_out());
        assert_eq!(
            record.buy_tickets(&buyer, 1, NOW),
            Err(RaffleError::InsufficientTicketsRemaining)
        );
        assert_invariants(&record);
    }

    #[test]
    fn buy_more_than_max_leaves_entrants_empty() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 1, 120);

        assert_eq!(
            record.buy_tickets(&Pubkey::new_unique(), 2, NOW),
            Err(RaffleError::InsufficientTicketsRemaining)
        );
        assert!(record.entrants.is_empty());
    }

    #[test]
    fn buy_rejected_at_end_time_and_for_zero_quantity() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 3, 120);
        let buyer = Pubkey::new_unique();

        assert_eq!(record.buy_tickets(&buyer, 0, NOW), Err(RaffleError::ZeroQuantity));
        assert_eq!(
            record.buy_tickets(&buyer, 1, NOW + 120),
            Err(RaffleError::RaffleEnded)
        );
        assert_eq!(record.buy_tickets(&buyer, 1, NOW + 119), Ok(100_000));
    }

    #[test]
    fn request_draw_preconditions() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 5, 10);

        // Scenario B: nobody bought a ticket
        assert_eq!(record.request_draw(NOW), Err(RaffleError::RaffleNotOver));
        assert_eq!(record.request_draw(NOW + 11), Err(RaffleError::NoEntrants));
        assert_eq!(record.draw, DrawState::Open);

        record.buy_tickets(&Pubkey::new_unique(), 1, NOW).unwrap();
        assert_eq!(record.request_draw(NOW + 9), Err(RaffleError::RaffleNotOver));
    }

    #[test]
    fn request_draw_at_end_time_boundary() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 5, 10);
        record.buy_tickets(&Pubkey::new_unique(), 1, NOW).unwrap();

        assert_eq!(record.request_draw(NOW + 10), Ok(()));
        assert_eq!(record.draw, DrawState::Requested);
        assert_eq!(
            record.request_draw(NOW + 10),
            Err(RaffleError::WinnerAlreadyDrawn)
        );
    }

    #[test]
    fn request_draw_when_sold_out_before_end() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 2, 120);
        record.buy_tickets(&Pubkey::new_unique(), 2, NOW).unwrap();

        assert_eq!(RafflePhase::of(Some(&record), NOW), RafflePhase::Ended);
        assert_eq!(record.request_draw(NOW), Ok(()));
        assert_eq!(RafflePhase::of(Some(&record), NOW), RafflePhase::DrawRequested);
    }

    #[test]
    fn callback_before_request() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 2, 120);
        record.buy_tickets(&Pubkey::new_unique(), 2, NOW).unwrap();

        assert_eq!(
            record.fulfill_draw(&f.oracle, true, &Fixture::randomness(1), &f.settings),
            Err(RaffleError::DrawNotStarted)
        );
    }

    #[test]
    fn callback_only_once() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 2, 120);
        record.buy_tickets(&Pubkey::new_unique(), 2, NOW).unwrap();
        record.request_draw(NOW).unwrap();

        assert_eq!(
            record.fulfill_draw(&f.oracle, true, &Fixture::randomness(7), &f.settings),
            Ok(1)
        );
        // same payload and a different payload are both replays
        assert_eq!(
            record.fulfill_draw(&f.oracle, true, &Fixture::randomness(7), &f.settings),
            Err(RaffleError::CallbackAlreadyInvoked)
        );
        assert_eq!(
            record.fulfill_draw(&f.oracle, true, &Fixture::randomness(8), &f.settings),
            Err(RaffleError::CallbackAlreadyInvoked)
        );
        assert_eq!(record.draw, DrawState::Drawn { winner_index: 1 });
    }

    #[test]
    fn callback_authenticity_checked_last() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 2, 120);
        record.buy_tickets(&Pubkey::new_unique(), 2, NOW).unwrap();
        let forger = Pubkey::new_unique();

        // state errors win over the identity check
        assert_eq!(
            record.fulfill_draw(&forger, true, &Fixture::randomness(1), &f.settings),
            Err(RaffleError::DrawNotStarted)
        );

        record.request_draw(NOW).unwrap();
        assert_eq!(
            record.fulfill_draw(&forger, true, &Fixture::randomness(1), &f.settings),
            Err(RaffleError::CallbackNotFromOracle)
        );
        assert_eq!(
            record.fulfill_draw(&f.oracle, false, &Fixture::randomness(1), &f.settings),
            Err(RaffleError::CallbackNotFromOracle)
        );
        assert_eq!(record.draw, DrawState::Requested);
    }

    #[test]
    fn claim_preconditions() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 2, 120);
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        record.buy_tickets(&alice, 1, NOW).unwrap();
        record.buy_tickets(&bob, 1, NOW).unwrap();

        assert_eq!(record.claim_prize(&alice), Err(RaffleError::WinnerNotYetDrawn));
        record.request_draw(NOW).unwrap();
        assert_eq!(record.claim_prize(&alice), Err(RaffleError::WinnerNotYetDrawn));

        // even randomness picks index 0
        record
            .fulfill_draw(&f.oracle, true, &Fixture::randomness(4), &f.settings)
            .unwrap();

        // Scenario D: wrong identity
        assert_eq!(record.claim_prize(&bob), Err(RaffleError::NotWinner));
        assert!(!record.draw.is_claimed());

        assert_eq!(record.claim_prize(&alice), Ok(200_000));
        assert_eq!(record.claim_prize(&alice), Err(RaffleError::PrizeAlreadyClaimed));
        assert_invariants(&record);
    }

    #[test]
    fn close_authorization() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 2, 120);
        let stranger = Pubkey::new_unique();

        // Scenario E
        assert_eq!(
            record.authorize_close(&stranger, &f.settings),
            Err(RaffleError::UnauthorizedCloser)
        );
        assert_eq!(record.authorize_close(&f.manager, &f.settings), Ok(()));
        assert_eq!(record.authorize_close(&f.settings.admin, &f.settings), Ok(()));

        record.buy_tickets(&stranger, 1, NOW).unwrap();
        assert_eq!(
            record.authorize_close(&f.manager, &f.settings),
            Err(RaffleError::RaffleStillActive)
        );
        assert_eq!(
            record.authorize_close(&stranger, &f.settings),
            Err(RaffleError::UnauthorizedCloser)
        );
    }

    #[test]
    fn stuck_draw_cannot_be_closed() {
        let f = Fixture::new();
        let mut record = f.raffle(100_000, 1, 120);
        record.buy_tickets(&Pubkey::new_unique(), 1, NOW).unwrap();
        record.request_draw(NOW).unwrap();

        assert_eq!(
            record.authorize_close(&f.settings.admin, &f.settings),
            Err(RaffleError::RaffleStillActive)
        );
    }

    #[test]
    fn full_lifecycle() {
        // Scenario A
        let mut f = Fixture::new();
        f.settings.min_ticket_price = 100;
        let mut record = f.raffle(100, 2, 120);
        let buyer1 = Pubkey::new_unique();
        let buyer2 = Pubkey::new_unique();

        record.buy_tickets(&buyer1, 1, NOW).unwrap();
        record.buy_tickets(&buyer2, 1, NOW + 1).unwrap();
        record.request_draw(NOW + 2).unwrap();

        let randomness = Fixture::randomness(0x2b);
        let winner_index = record
            .fulfill_draw(&f.oracle, true, &randomness, &f.settings)
            .unwrap();
        assert_eq!(winner_index, 0x2b % 2);

        let winner = record.entrants[winner_index as usize];
        assert_eq!(record.claim_prize(&winner), Ok(200));
        assert_eq!(RafflePhase::of(Some(&record), NOW + 3), RafflePhase::Claimed);
        assert_eq!(record.authorize_close(&f.manager, &f.settings), Ok(()));
        assert_invariants(&record);
    }
}
