use crate::config::GridShape;
use crate::error::PipelineError;
use crate::geometry::Quadrilateral;

/// A quad placed in the card grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSlot {
    pub row: usize,
    pub col: usize,
    pub label: String,
    pub quad: Quadrilateral,
}

/// Assign quads to grid cells in row-major order.
///
/// Quads are sorted by centroid y and cut into rows of `grid.cols`; each row
/// is then sorted by centroid x. The result is independent of input order.
pub fn sort_into_grid(
    quads: Vec<Quadrilateral>,
    grid: GridShape,
    labels: &[String],
) -> Result<Vec<GridSlot>, PipelineError> {
    let cells = grid.cells();
    if quads.len() != cells {
        return Err(PipelineError::InsufficientDetections {
            found: quads.len(),
            required: cells,
        });
    }
    if labels.len() != cells {
        return Err(PipelineError::InvalidConfig(format!(
            "{} labels for a {}x{} grid",
            labels.len(),
            grid.rows,
            grid.cols
        )));
    }

    let mut keyed: Vec<(f64, f64, Quadrilateral)> = quads
        .into_iter()
        .map(|q| {
            let c = q.centroid();
            (c.x, c.y, q)
        })
        .collect();
    keyed.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)));

    let mut slots = Vec::with_capacity(cells);
    let mut labels = labels.iter();
    let mut remaining = keyed.into_iter();
    for row in 0..grid.rows {
        let mut row_quads: Vec<(f64, f64, Quadrilateral)> =
            remaining.by_ref().take(grid.cols).collect();
        row_quads.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        for (col, (_, _, quad)) in row_quads.into_iter().enumerate() {
            let label = labels.next().cloned().unwrap_or_default();
            slots.push(GridSlot {
                row,
                col,
                label,
                quad,
            });
        }
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn card_at(x: f64, y: f64) -> Quadrilateral {
        Quadrilateral::from_points([
            Point2::new(x, y),
            Point2::new(x + 100.0, y + 4.0),
            Point2::new(x + 98.0, y + 64.0),
            Point2::new(x - 2.0, y + 60.0),
        ])
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grid_order_is_independent_of_input_order() {
        // Slight vertical jitter inside each row.
        let cards = [
            card_at(20.0, 30.0),
            card_at(200.0, 22.0),
            card_at(25.0, 150.0),
            card_at(205.0, 160.0),
        ];
        let names = labels(&["yoga", "mikuni", "jennifer", "senzaki"]);
        let orders = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2], [3, 0, 2, 1]];

        for order in orders {
            let quads: Vec<Quadrilateral> = order.iter().map(|&i| cards[i].clone()).collect();
            let slots = sort_into_grid(quads, GridShape::new(2, 2), &names).unwrap();
            let placed: Vec<(usize, usize, &str, Quadrilateral)> = slots
                .iter()
                .map(|s| (s.row, s.col, s.label.as_str(), s.quad.clone()))
                .collect();
            assert_eq!(
                placed,
                vec![
                    (0, 0, "yoga", cards[0].clone()),
                    (0, 1, "mikuni", cards[1].clone()),
                    (1, 0, "jennifer", cards[2].clone()),
                    (1, 1, "senzaki", cards[3].clone()),
                ]
            );
        }
    }

    #[test]
    fn test_three_column_grid() {
        let cards: Vec<Quadrilateral> = vec![
            card_at(400.0, 10.0),
            card_at(10.0, 200.0),
            card_at(200.0, 12.0),
            card_at(10.0, 8.0),
            card_at(400.0, 205.0),
            card_at(200.0, 198.0),
        ];
        let names = labels(&["a", "b", "c", "d", "e", "f"]);
        let slots = sort_into_grid(cards, GridShape::new(2, 3), &names).unwrap();
        let xs: Vec<(usize, usize, i64)> = slots
            .iter()
            .map(|s| (s.row, s.col, s.quad.points[0].x as i64))
            .collect();
        assert_eq!(
            xs,
            vec![(0, 0, 10), (0, 1, 200), (0, 2, 400), (1, 0, 10), (1, 1, 200), (1, 2, 400)]
        );
    }

    #[test]
    fn test_wrong_quad_count_is_rejected() {
        let names = labels(&["a", "b", "c", "d"]);
        let result = sort_into_grid(vec![card_at(0.0, 0.0)], GridShape::new(2, 2), &names);
        assert!(matches!(
            result,
            Err(PipelineError::InsufficientDetections { found: 1, required: 4 })
        ));
    }
}
