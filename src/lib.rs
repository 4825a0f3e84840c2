pub mod constants;
pub mod discovery;
pub mod error;
pub mod hooks;
pub mod link;
pub mod logger;
pub mod netconf;
pub mod resolv;
pub mod server;
pub mod userdata;
pub mod vmi;

#[cfg(test)]
mod testing;
