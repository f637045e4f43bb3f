//! Expense form validation.
//!
//! The sync layer trusts its input; this is the check the presentation runs
//! before calling `add`/`edit`. Messages are the ones shown to the user.

use api_types::{
    Amount, AmountError,
    auth::UserId,
    expense::{Expense, ExpenseChanges, NewExpense},
};
use chrono::{DateTime, Utc};

use crate::error::SyncError;

pub const DESCRIPTION_MIN_CHARS: usize = 3;
pub const DESCRIPTION_MAX_CHARS: usize = 100;

/// Validated input of `add` and `edit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpenseFields {
    pub description: String,
    pub amount: Amount,
    pub date: DateTime<Utc>,
}

impl ExpenseFields {
    pub fn changes(&self) -> ExpenseChanges {
        ExpenseChanges {
            description: self.description.clone(),
            amount: self.amount,
            date: self.date,
        }
    }

    pub fn for_user(&self, user_id: &UserId) -> NewExpense {
        NewExpense {
            description: self.description.clone(),
            amount: self.amount,
            date: self.date,
            user_id: user_id.clone(),
        }
    }
}

/// Raw form values; the amount is edited as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpenseForm {
    pub description: String,
    pub amount: String,
    pub date: DateTime<Utc>,
}

impl ExpenseForm {
    /// Pre-fills the form from an existing row.
    pub fn from_expense(expense: &Expense) -> Self {
        Self {
            description: expense.description.clone(),
            amount: expense.amount.to_string(),
            date: expense.date,
        }
    }

    pub fn validate(&self) -> Result<ExpenseFields, SyncError> {
        let description = self.description.trim();
        let chars = description.chars().count();
        if chars < DESCRIPTION_MIN_CHARS {
            return Err(invalid("A descrição deve ter no mínimo 3 caracteres"));
        }
        if chars > DESCRIPTION_MAX_CHARS {
            return Err(invalid("A descrição deve ter no máximo 100 caracteres"));
        }

        let amount = self.amount.parse::<Amount>().map_err(|err| match err {
            AmountError::TooManyDecimals => invalid("O valor deve ter no máximo 2 casas decimais"),
            AmountError::Empty | AmountError::Invalid | AmountError::Overflow => {
                invalid("O valor deve ser um número válido")
            }
        })?;
        if !amount.is_positive() {
            return Err(invalid("O valor deve ser maior que zero"));
        }

        Ok(ExpenseFields {
            description: description.to_string(),
            amount,
            date: self.date,
        })
    }
}

fn invalid(message: &str) -> SyncError {
    SyncError::ValidationFailed(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(description: &str, amount: &str) -> ExpenseForm {
        ExpenseForm {
            description: description.to_string(),
            amount: amount.to_string(),
            date: api_types::date::parse("2024-01-01").unwrap(),
        }
    }

    #[test]
    fn accepts_valid_input() {
        let fields = form("  Mercado  ", "10.50").validate().unwrap();
        assert_eq!(fields.description, "Mercado");
        assert_eq!(fields.amount, Amount::from_cents(1050));
    }

    #[test]
    fn description_bounds() {
        assert!(form("abc", "1").validate().is_ok());
        assert_eq!(
            form("ab", "1").validate(),
            Err(invalid("A descrição deve ter no mínimo 3 caracteres"))
        );
        assert!(form(&"a".repeat(100), "1").validate().is_ok());
        assert_eq!(
            form(&"a".repeat(101), "1").validate(),
            Err(invalid("A descrição deve ter no máximo 100 caracteres"))
        );
        // Counted in characters, not bytes.
        assert!(form("pão", "1").validate().is_ok());
    }

    #[test]
    fn amount_rules() {
        assert_eq!(
            form("Mercado", "0").validate(),
            Err(invalid("O valor deve ser maior que zero"))
        );
        assert_eq!(
            form("Mercado", "1.234").validate(),
            Err(invalid("O valor deve ter no máximo 2 casas decimais"))
        );
        assert_eq!(
            form("Mercado", "abc").validate(),
            Err(invalid("O valor deve ser um número válido"))
        );
        assert!(form("Mercado", "0.01").validate().is_ok());
    }

    #[test]
    fn prefill_round_trips_existing_row() {
        let expense = Expense {
            id: "1".into(),
            description: "Cinema".to_string(),
            amount: Amount::from_cents(3250),
            date: api_types::date::parse("2024-02-10").unwrap(),
            user_id: "u1".into(),
            category_id: None,
            category: None,
        };
        let fields = ExpenseForm::from_expense(&expense).validate().unwrap();
        assert_eq!(fields.changes().amount, expense.amount);
        assert_eq!(fields.for_user(&expense.user_id).user_id, expense.user_id);
    }
}
