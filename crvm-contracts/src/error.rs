use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContractError {
    #[error("a contract is already deployed at this address")]
    AlreadyDeployed,

    #[error("contract code of {size} bytes exceeds the {limit} byte limit")]
    CodeTooLarge { size: usize, limit: usize },

    #[error("no contract deployed at this address")]
    NotFound,

    #[error(transparent)]
    Kv(#[from] crvm_kv::Error),
}
