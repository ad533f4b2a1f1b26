pub mod remote_file;
pub mod reopen;
pub mod resource;
pub mod tell;
