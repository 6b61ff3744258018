fn main() -> anyhow::Result<()> {
    diggo_lib::run()
}
