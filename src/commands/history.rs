use crate::error::Result;
use crate::training::RunHistory;
use crate::validation;
use clap::ArgMatches;
use std::fmt::Write;
use std::path::Path;

pub fn history(app_m: &ArgMatches) -> Result<()> {
	let path = Path::new(app_m.value_of("HISTORY_FILE").unwrap_or_default());
	let history = RunHistory::load(validation::validate_input_file(path)?)?;
	print!("{}", format_history(&history));
	Ok(())
}

/// One line per epoch, marking the epoch with the lowest validation loss.
pub fn format_history(history: &RunHistory) -> String {
	let m = &history.model;
	let mut out = String::new();
	let _ = writeln!(
		out,
		"model: {} channel(s), {}px patches, {} layers, {} filters, {}x{} kernels",
		m.num_channels, m.patch_size, m.num_layers, m.num_filters, m.kernel_size, m.kernel_size
	);

	if history.epochs() == 0 {
		let _ = writeln!(out, "no completed epochs");
		return out;
	}

	let best = history
		.val
		.iter()
		.enumerate()
		.fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
			Some((_, b)) if !(v < b) => best,
			_ => Some((i, v)),
		})
		.map(|(i, _)| i);

	let _ = writeln!(out, "{:>5}  {:>14}  {:>14}  {:>9}", "epoch", "train", "val", "PSNR");
	for i in 0..history.epochs() {
		let _ = writeln!(
			out,
			"{:>5}  {:>14.6}  {:>14.6}  {:>9.3}{}",
			i + 1,
			history.train[i],
			history.val[i],
			history.psnr[i],
			if Some(i) == best { "  *" } else { "" }
		);
	}
	out
}
