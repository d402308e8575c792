//! Console summary tables.

use bootstrap_deploy::{
    BootstrapFailure, BootstrapReport, ContractArtifact, SigningIdentity, network::TxReceipt,
};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Item", "Value"]);
    table
}

fn receipt(receipt: Option<&TxReceipt>) -> String {
    match receipt {
        Some(TxReceipt {
            tx_id: Some(tx_id),
            block_height: Some(height),
        }) => format!("{tx_id} (block {height})"),
        Some(TxReceipt {
            tx_id: Some(tx_id), ..
        }) => tx_id.to_string(),
        Some(_) => "confirmed".to_string(),
        None => "-".to_string(),
    }
}

pub fn report_table(report: &BootstrapReport) -> Table {
    let mut table = table();
    table.add_row(vec!["Network".to_string(), report.network.clone()]);
    if let Some(deployer) = report.deployer {
        table.add_row(vec!["Deployer".to_string(), deployer.to_string()]);
    }
    table.add_row(vec!["Owner".to_string(), report.owner.to_string()]);
    if let Some(admin) = report.admin {
        table.add_row(vec!["Admin".to_string(), admin.to_string()]);
    }
    table.add_row(vec!["Contract".to_string(), report.contract_id.to_string()]);
    if let Some(state) = report.resumed_from {
        table.add_row(vec!["Resumed after".to_string(), state.to_string()]);
    }
    table.add_row(vec!["Deployment tx".to_string(), receipt(report.deployment.as_ref())]);
    table.add_row(vec!["Admin grant tx".to_string(), receipt(report.admin_grant.as_ref())]);
    table.add_row(vec!["Config update tx".to_string(), receipt(report.config_update.as_ref())]);
    if let Some(config) = &report.protocol_config {
        table.add_row(vec![
            "Protocol config".to_string(),
            format!(
                "fee receiver {}\nprotocol fee {}\nliquidation fee {}\nliquidator fee {}\n\
                 loan request expiry {}s\noracle max stale {}s\nmin loan duration {}s",
                config.protocol_fee_receiver,
                config.protocol_fee,
                config.protocol_liquidation_fee,
                config.liquidator_fee,
                config.time_request_loan_expires,
                config.oracle_max_stale,
                config.min_loan_duration
            ),
        ]);
    }
    table.add_row(vec!["State".to_string(), report.state.to_string()]);
    table
}

pub fn failure_table(failure: &BootstrapFailure) -> Table {
    let mut table = table();
    table.add_row(vec!["Error".to_string(), failure.error.to_string()]);
    table.add_row(vec!["Halted in state".to_string(), failure.state.to_string()]);
    table.add_row(vec![
        "Contract".to_string(),
        failure
            .contract_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec!["Exit code".to_string(), failure.exit_code().to_string()]);
    table
}

pub fn check_table(artifact: &ContractArtifact, identities: &[SigningIdentity]) -> Table {
    let mut table = table();
    table.add_row(vec![
        "Bytecode".to_string(),
        format!(
            "{} ({} bytes, sha256 {})",
            artifact.paths().bytecode.display(),
            artifact.bytecode().len(),
            artifact.digest()
        ),
    ]);
    table.add_row(vec!["ABI".to_string(), artifact.paths().abi.display().to_string()]);
    for identity in identities {
        table.add_row(vec![identity.role().to_string(), identity.address().to_string()]);
    }
    table
}
