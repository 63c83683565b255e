use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::grid::Grid;
use crate::models::match_record::Difficulty;
use crate::services::errors::puzzle_service_errors::PuzzleServiceError;

/// Puzzle collaborator: grid construction and Sudoku rule checks. The rooms
/// and the matchmaking engine only see this trait.
#[async_trait]
pub trait PuzzleService: Send + Sync {
    /// Produce a puzzle and its solution for the given difficulty.
    async fn generate(&self, difficulty: Difficulty) -> Result<(Grid, Grid), PuzzleServiceError>;

    /// Would placing `value` at (row, col) break row/column/box uniqueness on
    /// this grid? The target cell's current content is ignored.
    fn is_valid_placement(&self, grid: &Grid, row: usize, col: usize, value: u8) -> bool;

    /// Is the grid fully filled with every row, column and box a permutation
    /// of 1-9?
    fn is_complete(&self, grid: &Grid) -> bool;
}

/// Default implementation. Solutions are produced by permuting a base valid
/// grid (digit relabeling plus row/column shuffles within bands and stacks,
/// plus band/stack shuffles), then blanking cells per difficulty.
#[derive(Clone, Default)]
pub struct SudokuService;

impl SudokuService {
    pub fn new() -> Self {
        SudokuService
    }

    fn cells_to_remove(difficulty: Difficulty) -> usize {
        match difficulty {
            Difficulty::Easy => 35,
            Difficulty::Medium => 45,
            Difficulty::Hard => 52,
        }
    }

    fn base_solution() -> Grid {
        let mut grid = Grid::empty();
        for row in 0..9 {
            for col in 0..9 {
                let value = ((row * 3 + row / 3 + col) % 9) as u8 + 1;
                grid.set(row, col, value);
            }
        }
        grid
    }

    fn permuted_solution(rng: &mut impl Rng) -> Grid {
        let base = Self::base_solution();

        // Digit relabeling.
        let mut digits: Vec<u8> = (1..=9).collect();
        digits.shuffle(rng);

        // Row order: shuffle rows inside each band, then the bands themselves.
        let mut rows: Vec<usize> = (0..9).collect();
        for band in 0..3 {
            rows[band * 3..band * 3 + 3].shuffle(rng);
        }
        let mut bands: Vec<usize> = (0..3).collect();
        bands.shuffle(rng);
        let row_order: Vec<usize> = bands
            .iter()
            .flat_map(|&b| rows[b * 3..b * 3 + 3].to_vec())
            .collect();

        // Same for columns and stacks.
        let mut cols: Vec<usize> = (0..9).collect();
        for stack in 0..3 {
            cols[stack * 3..stack * 3 + 3].shuffle(rng);
        }
        let mut stacks: Vec<usize> = (0..3).collect();
        stacks.shuffle(rng);
        let col_order: Vec<usize> = stacks
            .iter()
            .flat_map(|&s| cols[s * 3..s * 3 + 3].to_vec())
            .collect();

        let mut solution = Grid::empty();
        for row in 0..9 {
            for col in 0..9 {
                let value = base.get(row_order[row], col_order[col]);
                solution.set(row, col, digits[(value - 1) as usize]);
            }
        }
        solution
    }

    fn unit_is_complete(values: [u8; 9]) -> bool {
        let mut seen = [false; 10];
        for v in values {
            if v == 0 || seen[v as usize] {
                return false;
            }
            seen[v as usize] = true;
        }
        true
    }
}

#[async_trait]
impl PuzzleService for SudokuService {
    async fn generate(&self, difficulty: Difficulty) -> Result<(Grid, Grid), PuzzleServiceError> {
        let mut rng = rand::thread_rng();
        let solution = Self::permuted_solution(&mut rng);

        let mut cells: Vec<(usize, usize)> = (0..9)
            .flat_map(|r| (0..9).map(move |c| (r, c)))
            .collect();
        cells.shuffle(&mut rng);

        let mut puzzle = solution;
        for &(row, col) in cells.iter().take(Self::cells_to_remove(difficulty)) {
            puzzle.set(row, col, 0);
        }

        Ok((puzzle, solution))
    }

    fn is_valid_placement(&self, grid: &Grid, row: usize, col: usize, value: u8) -> bool {
        if !(1..=9).contains(&value) {
            return false;
        }

        for i in 0..9 {
            if i != col && grid.get(row, i) == value {
                return false;
            }
            if i != row && grid.get(i, col) == value {
                return false;
            }
        }

        let box_row = (row / 3) * 3;
        let box_col = (col / 3) * 3;
        for r in box_row..box_row + 3 {
            for c in box_col..box_col + 3 {
                if (r, c) != (row, col) && grid.get(r, c) == value {
                    return false;
                }
            }
        }
        true
    }

    fn is_complete(&self, grid: &Grid) -> bool {
        for i in 0..9 {
            let row: [u8; 9] = std::array::from_fn(|j| grid.get(i, j));
            let col: [u8; 9] = std::array::from_fn(|j| grid.get(j, i));
            if !Self::unit_is_complete(row) || !Self::unit_is_complete(col) {
                return false;
            }
        }
        for box_row in (0..9).step_by(3) {
            for box_col in (0..9).step_by(3) {
                let cells: [u8; 9] =
                    std::array::from_fn(|i| grid.get(box_row + i / 3, box_col + i % 3));
                if !Self::unit_is_complete(cells) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn service() -> SudokuService {
        SudokuService::new()
    }

    #[test]
    fn base_solution_is_complete() {
        assert!(service().is_complete(&SudokuService::base_solution()));
    }

    #[tokio::test]
    async fn generated_solution_is_complete_and_matches_puzzle() {
        let (puzzle, solution) = service().generate(Difficulty::Medium).await.unwrap();

        assert!(service().is_complete(&solution));
        assert!(!puzzle.is_filled());
        assert_eq!(puzzle.empty_cells().len(), 45);

        // Every given in the puzzle agrees with the solution.
        for row in 0..9 {
            for col in 0..9 {
                let given = puzzle.get(row, col);
                assert!(given == 0 || given == solution.get(row, col));
            }
        }
    }

    #[test_case(Difficulty::Easy, 35; "easy removes 35")]
    #[test_case(Difficulty::Medium, 45; "medium removes 45")]
    #[test_case(Difficulty::Hard, 52; "hard removes 52")]
    #[tokio::test]
    async fn difficulty_controls_blank_count(difficulty: Difficulty, blanks: usize) {
        let (puzzle, _) = service().generate(difficulty).await.unwrap();
        assert_eq!(puzzle.empty_cells().len(), blanks);
    }

    #[test]
    fn placement_rejects_row_column_and_box_conflicts() {
        let mut grid = Grid::empty();
        grid.set(0, 0, 5);

        // Same row, same column, same box.
        assert!(!service().is_valid_placement(&grid, 0, 8, 5));
        assert!(!service().is_valid_placement(&grid, 8, 0, 5));
        assert!(!service().is_valid_placement(&grid, 1, 1, 5));

        // Far corner is fine.
        assert!(service().is_valid_placement(&grid, 8, 8, 5));
        // Other values are fine anywhere.
        assert!(service().is_valid_placement(&grid, 0, 8, 6));
    }

    #[test]
    fn placement_ignores_the_target_cell_itself() {
        let mut grid = Grid::empty();
        grid.set(4, 4, 9);
        // Re-asserting the same value on the same cell is not a conflict.
        assert!(service().is_valid_placement(&grid, 4, 4, 9));
    }

    #[test_case(0; "zero is not placeable")]
    #[test_case(10; "ten is out of range")]
    fn placement_rejects_out_of_range_values(value: u8) {
        assert!(!service().is_valid_placement(&Grid::empty(), 0, 0, value));
    }

    #[test]
    fn completeness_rejects_a_duplicated_digit() {
        let mut grid = SudokuService::base_solution();
        // Introduce a duplicate without leaving a hole.
        let other = grid.get(0, 1);
        grid.set(0, 0, other);
        assert!(!service().is_complete(&grid));
    }

    #[test]
    fn completeness_rejects_holes() {
        let mut grid = SudokuService::base_solution();
        grid.set(3, 3, 0);
        assert!(!service().is_complete(&grid));
    }
}
