pub mod im;

// 重新导出常用类型，方便外部使用
pub use im::{
    client::ImClient,
    context::ClientConfig,
    error::{err_code, ErrorKind, ImError, ImResult},
    remote::{HttpRemote, HttpRemoteConfig, MemoryServer, RemoteService},
};
