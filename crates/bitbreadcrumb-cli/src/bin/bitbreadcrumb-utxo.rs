fn main() -> bitbreadcrumb_cli::Result<()> {
    bitbreadcrumb_cli::cli::run()
}
