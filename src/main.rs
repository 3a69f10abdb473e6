use std::collections::BTreeMap;

use anyhow::{bail, Context};
use clap::Parser;
use cli::*;

use initsvc::{
    log::{self, debug},
    service::select_backend,
    Host, Service, ServiceConfig,
};

mod cli;

fn main() -> anyhow::Result<()> {
    Cli::parse().run()
}

impl Cli {
    #[inline]
    pub fn run(self) -> anyhow::Result<()> {
        let _guard = log::default(self.log_level().unwrap_or(log::Level::ERROR), None);

        match &self.command {
            Commands::Detect => println!("{}", select_backend(&Host::system())),
            Commands::Install { args } => println!("{}", self.service()?.install(args)?),
            Commands::Remove => println!("{}", self.service()?.remove()?),
            Commands::Start => println!("{}", self.service()?.start()?),
            Commands::Stop => println!("{}", self.service()?.stop()?),
            Commands::Restart => println!("{}", self.service()?.restart()?),
            Commands::Status => println!("{}", self.service()?.status()?),
            Commands::Pid => println!("{}", self.service()?.pid()?),
            Commands::UpdateEnv { vars } => {
                let env = vars.iter().cloned().collect::<BTreeMap<_, _>>();
                println!("{}", self.service()?.update_environ(&env)?)
            }
        }

        Ok(())
    }

    fn service(&self) -> anyhow::Result<Service> {
        let service = match (&self.conf, &self.name) {
            (Some(conf), _) => {
                let definition = ServiceConfig::load_definition(conf)
                    .with_context(|| format!("failed to load {:?}", conf))?;
                Service::new(definition)
            }
            (None, Some(name)) => Service::attach(name)?,
            (None, None) => bail!("a service definition (-c) or a service name (-n) is required"),
        };
        debug!("{:?}", service);
        Ok(service)
    }
}
