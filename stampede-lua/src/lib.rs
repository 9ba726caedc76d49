pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("script value is nested too deeply")]
    ValueTooDeep,
}

mod host;
mod value;

pub use host::ScriptHost;
pub use value::Value;
