// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::Deserialize;
use serde::Serialize;

use super::CwndBounds;
use crate::Error;
use crate::Result;

/// The value a credit-based controller reports as its congestion window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CwndSemantics {
    /// The congestion window is always zero. The scheduler must rely on
    /// the writable bytes only.
    #[default]
    Disabled,

    /// The congestion window is the credit balance.
    EqualsCredit,
}

/// The credit balance of a connection, i.e. the number of bytes the sender
/// is currently permitted to transmit.
#[derive(Debug)]
pub struct CreditLedger {
    /// Credit balance in bytes.
    balance: u64,

    /// The value reported as congestion window.
    semantics: CwndSemantics,
}

impl CreditLedger {
    pub fn new(initial_balance: u64, semantics: CwndSemantics) -> Self {
        Self {
            balance: initial_balance,
            semantics,
        }
    }

    /// Return the credit balance.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Take bytes off the balance.
    ///
    /// Spending more than the balance is routine and leaves the balance at
    /// zero.
    pub fn debit(&mut self, bytes: u64) {
        self.balance = self.balance.saturating_sub(bytes);
    }

    /// Add earned credit to the balance.
    pub fn credit(&mut self, amount: u64) -> Result<()> {
        self.balance = self.balance.checked_add(amount).ok_or_else(|| {
            Error::Overflow(format!("credit {} + {}", self.balance, amount))
        })?;
        Ok(())
    }

    /// Clamp the balance into the given bounds.
    pub fn clamp(&mut self, bounds: &CwndBounds) {
        self.balance = bounds.clamp(self.balance);
    }

    /// Return the congestion window according to the configured semantics.
    pub fn congestion_window(&self) -> u64 {
        match self.semantics {
            CwndSemantics::Disabled => 0,
            CwndSemantics::EqualsCredit => self.balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_debit_saturates() {
        let mut l = CreditLedger::new(3000, CwndSemantics::EqualsCredit);
        l.debit(1200);
        assert_eq!(l.balance(), 1800);

        // Exhausted.
        l.debit(2000);
        assert_eq!(l.balance(), 0);
        l.debit(1200);
        assert_eq!(l.balance(), 0);
    }

    #[test]
    fn ledger_credit_overflow() {
        let mut l = CreditLedger::new(u64::MAX - 10, CwndSemantics::EqualsCredit);
        assert_eq!(l.credit(10), Ok(()));
        assert_eq!(l.balance(), u64::MAX);

        assert!(matches!(l.credit(1), Err(Error::Overflow(_))));
        assert_eq!(l.balance(), u64::MAX);
    }

    #[test]
    fn ledger_clamp() {
        let bounds = CwndBounds::new(1200, 2, 10);
        let mut l = CreditLedger::new(0, CwndSemantics::EqualsCredit);
        l.clamp(&bounds);
        assert_eq!(l.balance(), 2400);

        l.credit(100000).unwrap();
        l.clamp(&bounds);
        assert_eq!(l.balance(), 12000);
    }

    #[test]
    fn ledger_cwnd_semantics() {
        let l = CreditLedger::new(12000, CwndSemantics::Disabled);
        assert_eq!(l.congestion_window(), 0);
        assert_eq!(l.balance(), 12000);

        let l = CreditLedger::new(12000, CwndSemantics::EqualsCredit);
        assert_eq!(l.congestion_window(), 12000);
    }
}
