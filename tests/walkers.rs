//! A richer client automaton with a tagged-struct cell state.

use torus_stencil::reference::SequentialRing;
use torus_stencil::{RunConfig, ToroidalField};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Kind {
    #[default]
    Empty,
    Walker,
    Wall,
    Crash,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Dir {
    #[default]
    Left,
    Right,
}

impl Dir {
    fn reverse(self) -> Self {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Cell {
    kind: Kind,
    dir: Dir,
}

impl Cell {
    const WALL: Cell = Cell {
        kind: Kind::Wall,
        dir: Dir::Left,
    };

    fn walker(dir: Dir) -> Self {
        Cell {
            kind: Kind::Walker,
            dir,
        }
    }

    fn heading(&self, dir: Dir) -> bool {
        self.kind == Kind::Walker && self.dir == dir
    }
}

fn step(left: Cell, center: Cell, right: Cell) -> Cell {
    if center.kind == Kind::Wall {
        return center;
    }
    let from_left = left.heading(Dir::Right);
    let from_right = right.heading(Dir::Left);
    let bounces = (center.heading(Dir::Left) && left.kind == Kind::Wall)
        || (center.heading(Dir::Right) && right.kind == Kind::Wall);

    match (from_left, from_right, bounces) {
        (false, false, false) => Cell::default(),
        (false, false, true) => Cell::walker(center.dir.reverse()),
        (true, false, false) => left,
        (false, true, false) => right,
        _ => Cell {
            kind: Kind::Crash,
            dir: Dir::Left,
        },
    }
}

fn seeded_world(len: usize) -> Vec<Cell> {
    let mut cells = vec![Cell::default(); len];
    cells[7] = Cell::walker(Dir::Right);
    cells[10] = Cell::walker(Dir::Right);
    cells[30] = Cell::walker(Dir::Left);
    cells[42] = Cell::walker(Dir::Left);
    cells[32] = Cell::WALL;
    cells[60] = Cell::walker(Dir::Left);
    cells[61] = Cell::WALL;
    cells
}

fn count(cells: &[Cell], kind: Kind) -> usize {
    cells.iter().filter(|c| c.kind == kind).count()
}

#[test]
fn walkers_match_sequential_oracle_for_any_decomposition() {
    let cells = seeded_world(72);
    let mut oracle = SequentialRing::new(cells.clone());
    oracle.step_n(&step, 128);

    for threads in [1usize, 2, 3, 5, 8, 72] {
        let mut field = ToroidalField::from_cells(cells.clone()).unwrap();
        field
            .run_with(step, 128, &RunConfig::default().thread_count(threads))
            .unwrap();
        assert_eq!(field.as_slice(), oracle.cells(), "threads {threads}");
    }
}

#[test]
fn walls_never_move() {
    let cells = seeded_world(72);
    let mut field = ToroidalField::from_cells(cells).unwrap();
    field.run(step, 300, 6).unwrap();
    assert_eq!(field.get(32), Cell::WALL);
    assert_eq!(field.get(61), Cell::WALL);
    assert_eq!(count(field.as_slice(), Kind::Wall), 2);
}

#[test]
fn lone_walker_bounces_between_walls() {
    let mut field = ToroidalField::new(20).unwrap();
    field.set(0, Cell::WALL);
    field.set(10, Cell::WALL);
    field.set(3, Cell::walker(Dir::Right));

    // 3 -> 9 takes six steps, the bounce one more, back to 3 another six.
    field.run(step, 13, 4).unwrap();
    assert_eq!(field.get(3), Cell::walker(Dir::Left));
    assert_eq!(count(field.as_slice(), Kind::Walker), 1);
}
