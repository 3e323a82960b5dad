fn main() {
    ocr_review_cli::init_tracing("warn");

    if let Err(error) = ocr_review_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
