fn main() -> anyhow::Result<()> {
    fruitscan_lib::run()
}
