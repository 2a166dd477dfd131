use strata_application::cancel::CancelToken;

/// Cancels `token` on the first Ctrl-C. Stages observe the token between
/// days and between queue entries.
pub fn cancel_on_ctrl_c(token: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("strata-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!(error = %err, "signal runtime unavailable, ctrl-c will not cancel gracefully");
                    return;
                }
            };
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    tracing::warn!("interrupt received, finishing current unit of work");
                    token.cancel();
                }
                Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c"),
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "failed to spawn signal thread");
    }
}
