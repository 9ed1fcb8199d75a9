//! Binary that takes as standard in a graph instance, decides 3-colorability
//! with the requested solver and writes the verdict, the solver wall time in
//! nanoseconds and, if colorable, the witness coloring to standard out.

use std::error;
use std::io::{self, Write};
use std::time::Instant;

use tricolor::coloring::{ColoringSolver, Mode};

pub fn main() -> Result<(), Box<dyn error::Error>> {
    let stdin = io::stdin();
    let stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    let (mut solver, mode) = ColoringSolver::read_instance(stdin)?;
    let start = Instant::now();
    let colorable = match mode {
        Mode::Fast => solver.solve(),
        Mode::Exhaustive => solver.brute_force_solve(),
    };
    let elapsed = start.elapsed();

    // Validate
    if colorable {
        solver.validate_coloring()?;
    }

    writeln!(stdout, "{}", if colorable { "1" } else { "0" })?;
    writeln!(stdout, "{}", elapsed.as_nanos())?;
    if colorable {
        for (vertex, color) in &solver.coloring {
            writeln!(stdout, "{}: {}", vertex, color)?;
        }
    }
    Ok(())
}
