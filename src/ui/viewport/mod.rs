pub mod column_width_calculator;
