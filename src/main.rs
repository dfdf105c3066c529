fn main() {
    mulsen_pipeline::cli::run();
}
