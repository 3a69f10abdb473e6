pub mod initd;
pub mod systemd;
pub mod upstart;
