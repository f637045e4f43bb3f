//! One-line notifications printed after a mutation.

use engine::SyncError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Add,
    Edit,
    Delete,
}

impl Mutation {
    fn success(self) -> &'static str {
        match self {
            Self::Add => "Gasto adicionado com sucesso.",
            Self::Edit => "Gasto atualizado com sucesso.",
            Self::Delete => "Gasto excluído com sucesso.",
        }
    }

    fn failure(self) -> &'static str {
        match self {
            Self::Add => "Erro ao adicionar gasto",
            Self::Edit => "Erro ao atualizar gasto",
            Self::Delete => "Erro ao excluir gasto",
        }
    }
}

pub fn message(mutation: Mutation, result: &Result<(), SyncError>) -> String {
    match result {
        Ok(()) => format!("Sucesso! {}", mutation.success()),
        Err(SyncError::ValidationFailed(reason)) => format!("{}: {reason}", mutation.failure()),
        Err(SyncError::Unauthenticated) => {
            format!("{}: faça login para continuar", mutation.failure())
        }
        Err(SyncError::RemoteReadFailed(reason) | SyncError::RemoteWriteFailed(reason)) => {
            format!("{}: {reason}", mutation.failure())
        }
    }
}
