use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The last criterion value was below one.
    Converged,
    /// The iteration budget ran out first.
    MaxIterations,
    /// The criterion became NaN or infinite.
    NumericalFailure,
}

/// Outcome of [`newton`](crate::newton) or [`split_newton`](crate::split_newton).
#[derive(Debug, Clone)]
pub struct IterationResult {
    /// Final state.
    pub x: Vec<f64>,
    /// Last step taken; `None` when no step was computed.
    pub step: Option<Vec<f64>>,
    /// Newton iterations, or outer sweeps for a split solve.
    pub iterations: usize,
    /// Criterion of the last step; `None` when no step was computed.
    pub criterion: Option<f64>,
    pub status: SolveStatus,
}

impl IterationResult {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

pub(crate) fn status_of(criterion: Option<f64>, state_len: usize) -> SolveStatus {
    match criterion {
        _ if state_len == 0 => SolveStatus::Converged,
        Some(c) if c < 1.0 => SolveStatus::Converged,
        Some(c) if !c.is_finite() => SolveStatus::NumericalFailure,
        _ => SolveStatus::MaxIterations,
    }
}

#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    /// ||r(x)|| before the step.
    pub residual_norm: f64,
    pub criterion: f64,
    pub step_norm: f64,
    /// Pseudo-timestep used for this iteration; zero when disabled.
    pub dt: f64,
    pub armijo_factor: Option<f64>,
    pub bound_scaling: Option<f64>,
    pub linear_converged: bool,
    pub linear_iterations: usize,
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub sweep: usize,
    /// Split location of this level.
    pub loc: usize,
    /// Iterations spent on the suffix block in this sweep.
    pub inner_iterations: usize,
    pub criterion: f64,
    pub step_norm: f64,
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

pub trait Reporter {
    fn on_iteration(&mut self, report: &IterationReport);
    fn on_sweep(&mut self, _report: &SweepReport) {}
    fn on_finish(&mut self) {}
}

pub struct StdoutReporter {
    rows: Vec<IterationReport>,
    sweeps: Vec<SweepReport>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            sweeps: Vec::new(),
        }
    }

    fn iteration_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("residual").set_alignment(CellAlignment::Right),
            Cell::new("crit").set_alignment(CellAlignment::Right),
            Cell::new("step").set_alignment(CellAlignment::Right),
            Cell::new("dt").set_alignment(CellAlignment::Right),
            Cell::new("armijo").set_alignment(CellAlignment::Right),
            Cell::new("bounds").set_alignment(CellAlignment::Right),
            Cell::new("linear"),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.iteration).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.4e}", row.residual_norm)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3e}", row.criterion)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1e}", row.step_norm)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1e}", row.dt)).set_alignment(CellAlignment::Right),
                Cell::new(optional(row.armijo_factor)).set_alignment(CellAlignment::Right),
                Cell::new(optional(row.bound_scaling)).set_alignment(CellAlignment::Right),
                Cell::new(if row.linear_converged {
                    format!("ok ({})", row.linear_iterations)
                } else {
                    format!("stalled ({})", row.linear_iterations)
                }),
            ]);
        }
        table
    }

    fn sweep_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("sweep").set_alignment(CellAlignment::Right),
            Cell::new("loc").set_alignment(CellAlignment::Right),
            Cell::new("inner").set_alignment(CellAlignment::Right),
            Cell::new("crit").set_alignment(CellAlignment::Right),
            Cell::new("step").set_alignment(CellAlignment::Right),
        ]);
        for row in &self.sweeps {
            table.add_row(vec![
                Cell::new(row.sweep).set_alignment(CellAlignment::Right),
                Cell::new(row.loc).set_alignment(CellAlignment::Right),
                Cell::new(row.inner_iterations).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3e}", row.criterion)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1e}", row.step_norm)).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StdoutReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_sweep(&mut self, report: &SweepReport) {
        self.sweeps.push(report.clone());
    }

    fn on_finish(&mut self) {
        if self.rows.is_empty() && self.sweeps.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let tables = [
            (!self.rows.is_empty()).then(|| self.iteration_table()),
            (!self.sweeps.is_empty()).then(|| self.sweep_table()),
        ];
        for table in tables.into_iter().flatten() {
            for line in table.to_string().lines() {
                emit_line(line);
            }
        }
        self.rows.clear();
        self.sweeps.clear();
    }
}
