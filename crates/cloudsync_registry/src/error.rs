use cloudsync_rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no serve recorded for {0}")]
    UnknownServe(String),
    #[error("serve for {0} has no control-plane id")]
    MissingServeId(String),
    #[error("{0} is already being served")]
    AlreadyServing(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
