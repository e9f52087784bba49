use pingpong_life::config::LifeConfig;

fn main() -> anyhow::Result<()> {
    let config = LifeConfig::default();
    env_logger::Builder::new()
        .filter_level(config.log_level)
        .parse_default_env()
        .init();

    pingpong_life::run(config)
}
