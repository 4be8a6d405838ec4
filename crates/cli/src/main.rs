use std::process::ExitCode;

fn main() -> ExitCode {
    match dokan_cli::run() {
        Ok(code) => code,
        Err(error) => {
            // clap renders its own help and usage errors
            if let Some(clap_error) = error.downcast_ref::<clap::Error>() {
                let _ = clap_error.print();
                return ExitCode::from(clap_error.exit_code() as u8);
            }
            eprintln!("dokan: {error:#}");
            ExitCode::FAILURE
        }
    }
}
