fn main() {
    carpool::Server::default()
        .load_environment_variables()
        .set_config_from_env()
        .enable_migrations()
        .run();
}
