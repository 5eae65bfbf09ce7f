use {
    primitive_types::H160,
    std::{fmt, fmt::Display, num::NonZeroUsize},
    url::Url,
};

#[derive(clap::Parser)]
pub struct Arguments {
    /// Url of the Postgres database. By default connects to locally running
    /// postgres.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// Address of the wrapped native token buy side orders must quote as
    /// their payment token.
    #[clap(long, env)]
    pub wrapped_native_token: H160,

    /// The maximum number of orders of one batch validated concurrently,
    /// bounding load on the node and the database.
    #[clap(long, env, default_value = "20")]
    pub max_concurrent_validations: NonZeroUsize,
}

impl Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Self {
            db_url,
            wrapped_native_token,
            max_concurrent_validations,
        } = self;
        writeln!(f, "db_url: {}", db_url)?;
        writeln!(f, "wrapped_native_token: {:?}", wrapped_native_token)?;
        writeln!(
            f,
            "max_concurrent_validations: {}",
            max_concurrent_validations
        )?;
        Ok(())
    }
}
